use std::sync::LazyLock;

use be_remote_db::{MAX_IMAGES, TemplateContent, TemplateType};
use regex::Regex;
use url::Url;

use crate::error::SiteError;
use crate::template::check_items;
use crate::types::CreateSiteRequest;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

/// A create request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidSite {
    pub title: String,
    pub message: String,
    pub customer_email: String,
    pub special_date: Option<chrono::NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    pub template: TemplateContent,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_template_type(raw: &str) -> Option<TemplateType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "birthday" => Some(TemplateType::Birthday),
        "anniversary" => Some(TemplateType::Anniversary),
        "declaration" => Some(TemplateType::Declaration),
        _ => None,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_youtube_link(link: &str) -> bool {
    Url::parse(link).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https")
            && url
                .host_str()
                .is_some_and(|host| YOUTUBE_HOSTS.contains(&host))
    })
}

pub fn is_image_url(link: &str) -> bool {
    Url::parse(link).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

/// Blank means "no link".
pub fn normalize_youtube_link(link: Option<String>) -> Option<String> {
    link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
}

/// Checks the optional and shared fields of a site, appending problems.
pub fn check_content(
    youtube_link: Option<&str>,
    images: &[String],
    template: &TemplateContent,
    problems: &mut Vec<String>,
) {
    if let Some(link) = youtube_link
        && !is_youtube_link(link)
    {
        problems.push("youtubeLink must be a youtube.com or youtu.be URL".to_string());
    }

    if images.len() > MAX_IMAGES {
        problems.push(format!(
            "at most {MAX_IMAGES} images are allowed, got {}",
            images.len()
        ));
    }
    if let Some(bad) = images.iter().find(|image| !is_image_url(image)) {
        problems.push(format!("image '{bad}' is not an http(s) URL"));
    }

    if let Some(problem) = check_items(template) {
        problems.push(format!("{}: {problem}", template.template_type()));
    }
}

/// Validates a create request, reporting every problem at once.
pub fn validate_create(req: &CreateSiteRequest) -> Result<ValidSite, SiteError> {
    let mut problems = Vec::new();

    let title = present(&req.title);
    let message = present(&req.message);
    let customer_email = present(&req.customer_email);
    let template_type_raw = present(&req.template_type);

    for (name, value) in [
        ("title", &title),
        ("message", &message),
        ("templateType", &template_type_raw),
        ("customerEmail", &customer_email),
    ] {
        if value.is_none() {
            problems.push(format!("{name} is required"));
        }
    }

    let template_type = template_type_raw.as_deref().and_then(|raw| {
        let parsed = parse_template_type(raw);
        if parsed.is_none() {
            problems.push(format!(
                "templateType '{raw}' must be one of birthday, anniversary, declaration"
            ));
        }
        parsed
    });

    if let Some(email) = &customer_email
        && !is_valid_email(email)
    {
        problems.push(format!("customerEmail '{email}' is not a valid email address"));
    }

    let mut template = None;
    if let Some(template_type) = template_type {
        let mut bundles = req.bundles();
        if let Some(other) = bundles
            .iter()
            .find(|bundle| bundle.template_type() != template_type)
        {
            problems.push(format!(
                "{} text supplied for a {template_type} site",
                other.template_type()
            ));
        }
        let content = bundles
            .drain(..)
            .find(|bundle| bundle.template_type() == template_type)
            .unwrap_or_else(|| TemplateContent::empty(template_type));
        template = Some(content);
    }

    let youtube_link = normalize_youtube_link(req.youtube_link.clone());
    check_content(
        youtube_link.as_deref(),
        &req.images,
        template
            .as_ref()
            .unwrap_or(&TemplateContent::empty(TemplateType::Birthday)),
        &mut problems,
    );

    match (title, message, customer_email, template) {
        (Some(title), Some(message), Some(customer_email), Some(template))
            if problems.is_empty() =>
        {
            Ok(ValidSite {
                title,
                message,
                customer_email,
                special_date: req.special_date,
                youtube_link,
                images: req.images.clone(),
                template,
            })
        }
        _ => Err(SiteError::Validation(problems)),
    }
}

#[cfg(test)]
mod tests {
    use be_remote_db::{BirthdayText, DeclarationText, NamedItem};

    use super::*;

    fn birthday_request() -> CreateSiteRequest {
        CreateSiteRequest {
            title: Some("Sarah's Day".into()),
            message: Some("Happy birthday!".into()),
            template_type: Some("birthday".into()),
            customer_email: Some("buyer@example.com".into()),
            birthday: Some(BirthdayText {
                heading: "Happy 30th".into(),
                wishes: vec![NamedItem {
                    title: "Travel".into(),
                    description: "See Lisbon".into(),
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn problems(req: &CreateSiteRequest) -> Vec<String> {
        match validate_create(req) {
            Err(SiteError::Validation(problems)) => problems,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_complete_request() {
        let valid = validate_create(&birthday_request()).unwrap();
        assert_eq!(valid.title, "Sarah's Day");
        assert_eq!(valid.template.template_type(), TemplateType::Birthday);
        assert_eq!(valid.template.items().len(), 1);
    }

    #[test]
    fn missing_email_is_named() {
        let mut req = birthday_request();
        req.customer_email = None;
        assert_eq!(problems(&req), vec!["customerEmail is required".to_string()]);
    }

    #[test]
    fn lists_every_missing_field() {
        let problems = problems(&CreateSiteRequest::default());
        for field in ["title", "message", "templateType", "customerEmail"] {
            assert!(
                problems.iter().any(|p| p.starts_with(field)),
                "{field} missing from {problems:?}"
            );
        }
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let mut req = birthday_request();
        req.title = Some("   ".into());
        assert_eq!(problems(&req), vec!["title is required".to_string()]);
    }

    #[test]
    fn rejects_unknown_template_and_bad_email() {
        let mut req = birthday_request();
        req.template_type = Some("wedding".into());
        req.customer_email = Some("not-an-email".into());
        let problems = problems(&req);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn rejects_mismatched_bundle() {
        let mut req = birthday_request();
        req.declaration = Some(DeclarationText::default());
        assert_eq!(problems(&req).len(), 1);
    }

    #[test]
    fn missing_bundle_defaults_to_empty() {
        let mut req = birthday_request();
        req.birthday = None;
        let valid = validate_create(&req).unwrap();
        assert_eq!(valid.template, TemplateContent::empty(TemplateType::Birthday));
    }

    #[test]
    fn checks_links_and_images() {
        let mut req = birthday_request();
        req.youtube_link = Some("https://vimeo.com/123".into());
        req.images = (0..6)
            .map(|i| format!("https://cdn.example.com/{i}.jpg"))
            .collect();
        assert_eq!(problems(&req).len(), 2);

        let mut req = birthday_request();
        req.youtube_link = Some("https://youtu.be/dQw4w9WgXcQ".into());
        req.images = vec!["javascript:alert(1)".into()];
        assert_eq!(problems(&req).len(), 1);

        let mut req = birthday_request();
        req.youtube_link = Some("  ".into());
        assert!(validate_create(&req).unwrap().youtube_link.is_none());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@c.de"));
    }
}

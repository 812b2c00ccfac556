//! Field-by-field patches for the template text bundles.

use be_remote_db::{
    AnniversaryText, BirthdayText, DeclarationText, MAX_NAMED_ITEMS, NamedItem, TemplateContent,
    TemplateType,
};
use serde::Deserialize;

use crate::error::SiteError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthdayPatch {
    pub heading: Option<String>,
    pub wishes_title: Option<String>,
    pub wishes: Option<Vec<NamedItem>>,
    pub closing_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnniversaryPatch {
    pub heading: Option<String>,
    pub timeline_title: Option<String>,
    pub milestones: Option<Vec<NamedItem>>,
    pub closing_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationPatch {
    pub heading: Option<String>,
    pub reasons_title: Option<String>,
    pub reasons: Option<Vec<NamedItem>>,
    pub promise: Option<String>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl BirthdayPatch {
    pub fn apply(self, text: &mut BirthdayText) {
        set(&mut text.heading, self.heading);
        set(&mut text.wishes_title, self.wishes_title);
        set(&mut text.wishes, self.wishes);
        set(&mut text.closing_note, self.closing_note);
    }
}

impl AnniversaryPatch {
    pub fn apply(self, text: &mut AnniversaryText) {
        set(&mut text.heading, self.heading);
        set(&mut text.timeline_title, self.timeline_title);
        set(&mut text.milestones, self.milestones);
        set(&mut text.closing_note, self.closing_note);
    }
}

impl DeclarationPatch {
    pub fn apply(self, text: &mut DeclarationText) {
        set(&mut text.heading, self.heading);
        set(&mut text.reasons_title, self.reasons_title);
        set(&mut text.reasons, self.reasons);
        set(&mut text.promise, self.promise);
    }
}

#[derive(Debug, Clone)]
pub enum TemplatePatch {
    Birthday(BirthdayPatch),
    Anniversary(AnniversaryPatch),
    Declaration(DeclarationPatch),
}

impl TemplatePatch {
    pub fn template_type(&self) -> TemplateType {
        match self {
            TemplatePatch::Birthday(_) => TemplateType::Birthday,
            TemplatePatch::Anniversary(_) => TemplateType::Anniversary,
            TemplatePatch::Declaration(_) => TemplateType::Declaration,
        }
    }

    /// Merges into `content`, which must be the same template.
    pub fn merge_into(self, content: &mut TemplateContent) -> Result<(), SiteError> {
        match (self, content) {
            (TemplatePatch::Birthday(patch), TemplateContent::Birthday(text)) => patch.apply(text),
            (TemplatePatch::Anniversary(patch), TemplateContent::Anniversary(text)) => {
                patch.apply(text)
            }
            (TemplatePatch::Declaration(patch), TemplateContent::Declaration(text)) => {
                patch.apply(text)
            }
            (patch, content) => {
                return Err(SiteError::validation(format!(
                    "{} text cannot be applied to a {} site",
                    patch.template_type(),
                    content.template_type()
                )));
            }
        }
        Ok(())
    }
}

/// Problems with the named-item list of a bundle, if any.
pub fn check_items(content: &TemplateContent) -> Option<String> {
    let items = content.items();
    if items.len() > MAX_NAMED_ITEMS {
        return Some(format!(
            "at most {MAX_NAMED_ITEMS} items are allowed, got {}",
            items.len()
        ));
    }
    if items.iter().any(|item| item.title.trim().is_empty()) {
        return Some("every item needs a title".to_string());
    }
    None
}

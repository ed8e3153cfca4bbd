//! Reconciles the shapes a listing form can arrive in into one [`ListingForm`].
//!
//! A submission may carry the listing as a nested object (`{"Listing": {...}}`),
//! as bracket keys (`Listing[title]`), as dot keys (`Listing.title`), or as bare
//! top-level keys (`title`). Each field is taken from the first rule that yields it,
//! so shapes can be mixed within one submission.

use serde_json::{Map, Value};

/// Raw submitted fields, as decoded from a JSON body or a form.
pub type Submission = Map<String, Value>;

/// Accepted names for the wrapping object.
const ROOT_KEYS: [&str; 2] = ["Listing", "listing"];

pub const LISTING_FIELDS: [&str; 6] = ["title", "description", "price", "location", "country", "category"];

/// The canonical listing submission. Values are kept as submitted;
/// type checks belong to the validator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingForm {
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub price: Option<Value>,
    pub location: Option<Value>,
    pub country: Option<Value>,
    pub category: Option<Value>,
}

impl ListingForm {
    fn slot(&mut self, field: &str) -> Option<&mut Option<Value>> {
        match field {
            "title" => Some(&mut self.title),
            "description" => Some(&mut self.description),
            "price" => Some(&mut self.price),
            "location" => Some(&mut self.location),
            "country" => Some(&mut self.country),
            "category" => Some(&mut self.category),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.location.is_none()
            && self.country.is_none()
            && self.category.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractionRule {
    Nested,
    Bracket,
    Dot,
    Bare,
}

/// Strongest first.
const RULES: [ExtractionRule; 4] = [
    ExtractionRule::Nested,
    ExtractionRule::Bracket,
    ExtractionRule::Dot,
    ExtractionRule::Bare,
];

impl ExtractionRule {
    fn extract(self, submission: &Submission, field: &str) -> Option<Value> {
        let found = match self {
            Self::Nested => ROOT_KEYS
                .iter()
                .filter_map(|root| submission.get(*root)?.as_object()?.get(field))
                .next(),
            Self::Bracket => ROOT_KEYS
                .iter()
                .find_map(|root| submission.get(&format!("{}[{}]", root, field))),
            Self::Dot => ROOT_KEYS
                .iter()
                .find_map(|root| submission.get(&format!("{}.{}", root, field))),
            Self::Bare => submission.get(field),
        };
        found.filter(|v| is_present(field, v)).cloned()
    }
}

/// Nulls are absent. A blank category is too, as sent by an unselected `<select>`.
fn is_present(field: &str, value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) if field == "category" => !s.trim().is_empty(),
        _ => true,
    }
}

/// Build the canonical form, or `None` when no recognised field is present in any shape.
///
/// When a field appears in several shapes the nested object wins, then bracket
/// keys, then dot keys, then bare keys.
pub fn normalize(submission: &Submission) -> Option<ListingForm> {
    let mut form = ListingForm::default();

    for field in LISTING_FIELDS {
        if let Some(slot) = form.slot(field) {
            *slot = RULES.iter().find_map(|rule| rule.extract(submission, field));
        }
    }

    if form.is_empty() { None } else { Some(form) }
}

use serde_json::Value;
use tracing::info;

use stay_types::models::Category;

use crate::error::ListingError;
use crate::normalize::ListingForm;

/// Fields of a listing about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: String,
    pub country: String,
    pub category: Category,
}

/// Fields of an edit. Absent values keep what is stored; category is always resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub category: Category,
}

impl ListingPatch {
    /// Both halves of the address, if this edit supplied them.
    pub fn address(&self) -> Option<(&str, &str)> {
        Some((self.location.as_deref()?, self.country.as_deref()?))
    }
}

/// Collects one message per violated field.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: String) {
        self.0.push(message);
    }

    fn into_result<T>(self, value: T) -> Result<T, ListingError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ListingError::Validation(self.0.join(", ")))
        }
    }

    fn text(&mut self, field: &str, value: Option<&Value>, required: bool) -> Option<String> {
        match value {
            None => {
                if required {
                    self.push(format!("\"{}\" is required", field));
                }
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.push(format!("\"{}\" is not allowed to be empty", field));
                None
            }
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                self.push(format!("\"{}\" must be a string", field));
                None
            }
        }
    }

    fn price(&mut self, value: Option<&Value>) -> Option<f64> {
        let parsed = match value {
            None => return None,
            // Blank form inputs mean "no price".
            Some(Value::String(s)) if s.trim().is_empty() => return None,
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => None,
        };

        match parsed {
            Some(p) if !p.is_finite() => {
                self.push("\"price\" must be a number".to_string());
                None
            }
            Some(p) if p < 0.0 => {
                self.push("\"price\" must be greater than or equal to 0".to_string());
                None
            }
            Some(p) => Some(p),
            None => {
                self.push("\"price\" must be a number".to_string());
                None
            }
        }
    }

    fn category(&mut self, value: Option<&Value>, fallback: Option<Category>) -> Option<Category> {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => match s.trim().parse::<Category>() {
                Ok(c) => Some(c),
                Err(_) => {
                    self.push(format!("\"category\" must be one of [{}]", category_list()));
                    None
                }
            },
            Some(Value::String(_)) | None => match fallback {
                Some(c) => {
                    info!("Category omitted from edit, keeping stored '{}'", c);
                    Some(c)
                }
                None => {
                    self.push("\"category\" is required".to_string());
                    None
                }
            },
            Some(_) => {
                self.push("\"category\" must be a string".to_string());
                None
            }
        }
    }
}

fn category_list() -> String {
    Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

/// Validate a submission for a new listing. An absent form fails on every required field.
pub fn validate_new(form: Option<&ListingForm>) -> Result<ListingFields, ListingError> {
    let empty = ListingForm::default();
    let form = form.unwrap_or(&empty);
    let mut v = Violations::default();

    let title = v.text("title", form.title.as_ref(), true);
    let description = v.text("description", form.description.as_ref(), true);
    let price = v.price(form.price.as_ref());
    let location = v.text("location", form.location.as_ref(), true);
    let country = v.text("country", form.country.as_ref(), true);
    let category = v.category(form.category.as_ref(), None);

    match (title, description, location, country, category) {
        (Some(title), Some(description), Some(location), Some(country), Some(category)) => v
            .into_result(ListingFields {
                title,
                description,
                price,
                location,
                country,
                category,
            }),
        _ => v.into_result(()).and_then(|_| {
            Err(ListingError::Validation("listing data is incomplete".to_string()))
        }),
    }
}

/// Validate an edit. Only submitted fields are checked; `stored_category` stands in for
/// an omitted category so that a partial edit cannot clear it.
pub fn validate_update(
    form: Option<&ListingForm>,
    stored_category: Option<Category>,
) -> Result<ListingPatch, ListingError> {
    let empty = ListingForm::default();
    let form = form.unwrap_or(&empty);
    let mut v = Violations::default();

    let title = v.text("title", form.title.as_ref(), false);
    let description = v.text("description", form.description.as_ref(), false);
    let price = v.price(form.price.as_ref());
    let location = v.text("location", form.location.as_ref(), false);
    let country = v.text("country", form.country.as_ref(), false);
    let category = v.category(form.category.as_ref(), stored_category);

    match category {
        Some(category) => v.into_result(ListingPatch {
            title,
            description,
            price,
            location,
            country,
            category,
        }),
        None => v.into_result(()).and_then(|_| {
            Err(ListingError::Validation("\"category\" is required".to_string()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cabin() -> ListingForm {
        ListingForm {
            title: Some(json!("Cabin")),
            description: Some(json!("Cozy")),
            price: Some(json!(100)),
            location: Some(json!("Aspen")),
            country: Some(json!("USA")),
            category: Some(json!("mountain")),
        }
    }

    fn message(err: ListingError) -> String {
        match err {
            ListingError::Validation(m) => m,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_complete_form() {
        let fields = validate_new(Some(&cabin())).unwrap();
        assert_eq!(fields.title, "Cabin");
        assert_eq!(fields.price, Some(100.0));
        assert_eq!(fields.category, Category::Mountain);
    }

    #[test]
    fn every_category_is_accepted() {
        for category in Category::ALL {
            let mut form = cabin();
            form.category = Some(json!(category.as_str()));
            assert_eq!(validate_new(Some(&form)).unwrap().category, category);
        }
    }

    #[test]
    fn missing_category_fails_on_create() {
        let mut form = cabin();
        form.category = None;
        let msg = message(validate_new(Some(&form)).unwrap_err());
        assert!(msg.contains("category"), "{}", msg);
    }

    #[test]
    fn unknown_category_lists_choices() {
        let mut form = cabin();
        form.category = Some(json!("penthouse"));
        let msg = message(validate_new(Some(&form)).unwrap_err());
        assert!(msg.contains("must be one of"));
        assert!(msg.contains("iconic-cities"));
    }

    #[test]
    fn absent_form_reports_each_required_field() {
        let msg = message(validate_new(None).unwrap_err());
        for field in ["title", "description", "location", "country", "category"] {
            assert!(msg.contains(&format!("\"{}\" is required", field)), "{}", msg);
        }
        assert!(!msg.contains("price"));
    }

    #[test]
    fn messages_are_joined_per_field() {
        let mut form = cabin();
        form.title = Some(json!(""));
        form.price = Some(json!(-5));
        let msg = message(validate_new(Some(&form)).unwrap_err());
        assert_eq!(
            msg,
            "\"title\" is not allowed to be empty, \"price\" must be greater than or equal to 0"
        );
    }

    #[test]
    fn price_is_optional_and_parsed_from_text() {
        let mut form = cabin();
        form.price = None;
        assert_eq!(validate_new(Some(&form)).unwrap().price, None);

        form.price = Some(json!(""));
        assert_eq!(validate_new(Some(&form)).unwrap().price, None);

        form.price = Some(json!(" 125.5 "));
        assert_eq!(validate_new(Some(&form)).unwrap().price, Some(125.5));

        form.price = Some(json!("cheap"));
        assert!(message(validate_new(Some(&form)).unwrap_err()).contains("\"price\" must be a number"));
    }

    #[test]
    fn non_string_text_is_rejected() {
        let mut form = cabin();
        form.country = Some(json!(["USA"]));
        assert!(message(validate_new(Some(&form)).unwrap_err()).contains("\"country\" must be a string"));
    }

    #[test]
    fn update_falls_back_to_stored_category() {
        let form = ListingForm {
            title: Some(json!("Renamed")),
            ..Default::default()
        };
        let patch = validate_update(Some(&form), Some(Category::Castle)).unwrap();
        assert_eq!(patch.category, Category::Castle);
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
        assert!(patch.address().is_none());
    }

    #[test]
    fn update_prefers_submitted_category() {
        let form = ListingForm {
            category: Some(json!("pool")),
            ..Default::default()
        };
        let patch = validate_update(Some(&form), Some(Category::Castle)).unwrap();
        assert_eq!(patch.category, Category::Pool);
    }

    #[test]
    fn update_without_any_category_fails() {
        let msg = message(validate_update(None, None).unwrap_err());
        assert!(msg.contains("category"));
    }

    #[test]
    fn update_still_checks_submitted_fields() {
        let form = ListingForm {
            description: Some(json!("   ")),
            ..Default::default()
        };
        let msg = message(validate_update(Some(&form), Some(Category::Farm)).unwrap_err());
        assert_eq!(msg, "\"description\" is not allowed to be empty");
    }

    #[test]
    fn address_needs_both_halves() {
        let form = ListingForm {
            location: Some(json!("Aspen")),
            country: Some(json!("USA")),
            ..Default::default()
        };
        let patch = validate_update(Some(&form), Some(Category::Farm)).unwrap();
        assert_eq!(patch.address(), Some(("Aspen", "USA")));
    }
}

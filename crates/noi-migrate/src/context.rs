//! Lookup collaborators injected by the caller and the per-invocation
//! import context handed to constructors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::{NoiConfig, SiteConfig};
use crate::error::MigrationError;
use crate::row::{Choice, Entity, Fields, Value};

/// Maps a multilingual ("babel") value onto the concrete per-language
/// fields of the running site.
pub trait Localizer: Send + Sync {
    fn localize(&self, base: &str, value: Value) -> Fields;

    /// Concrete field names that `localize` produces for `base`.
    fn localized_names(&self, base: &str) -> Vec<String>;
}

/// Positional [`Localizer`]: list entry *i* fills the field of site
/// language *i*. The default language keeps the bare field name, the
/// others get a `_<lang>` suffix.
#[derive(Debug, Clone)]
pub struct SiteLocalizer {
    languages: Vec<String>,
}

impl SiteLocalizer {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    fn field_name(&self, base: &str, index: usize) -> String {
        match index {
            0 => base.to_string(),
            i => format!("{base}_{}", self.languages[i]),
        }
    }
}

impl Localizer for SiteLocalizer {
    fn localize(&self, base: &str, value: Value) -> Fields {
        let mut entries = match value {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            scalar => vec![scalar],
        }
        .into_iter();
        (0..self.languages.len().max(1))
            .map(|i| {
                let value = match entries.next() {
                    Some(Value::Null) | None => Value::Text(String::new()),
                    Some(v) => v,
                };
                (self.field_name(base, i), value)
            })
            .collect()
    }

    fn localized_names(&self, base: &str) -> Vec<String> {
        (0..self.languages.len().max(1))
            .map(|i| self.field_name(base, i))
            .collect()
    }
}

/// Maps legacy content-type ids to current model names.
pub trait ContentTypeRemapper: Send + Sync {
    fn remap(&self, legacy_id: i64) -> Option<&str>;
}

/// Table-backed [`ContentTypeRemapper`].
#[derive(Debug, Clone, Default)]
pub struct ContentTypeTable {
    models: BTreeMap<i64, String>,
}

impl ContentTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, legacy_id: i64, model: &str) -> Self {
        self.models.insert(legacy_id, model.to_string());
        self
    }
}

impl ContentTypeRemapper for ContentTypeTable {
    fn remap(&self, legacy_id: i64) -> Option<&str> {
        self.models.get(&legacy_id).map(String::as_str)
    }
}

/// Resolves legacy enumeration codes against the current choice lists.
pub trait ChoiceResolver: Send + Sync {
    /// Resolve `code` in `list`. Blank codes resolve to `Null`; values that
    /// are already resolved pass through.
    fn resolve(&self, list: &str, code: Value) -> Result<Value, MigrationError>;
}

/// Table-backed [`ChoiceResolver`].
#[derive(Debug, Clone, Default)]
pub struct ChoiceLists {
    lists: BTreeMap<String, BTreeMap<String, String>>,
}

impl ChoiceLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists(lists: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { lists }
    }

    /// Add (or replace) one choice list.
    pub fn with(mut self, list: &str, codes: &[(&str, &str)]) -> Self {
        self.lists.insert(
            list.to_string(),
            codes
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        );
        self
    }
}

impl ChoiceResolver for ChoiceLists {
    fn resolve(&self, list: &str, code: Value) -> Result<Value, MigrationError> {
        if code.is_blank() {
            return Ok(Value::Null);
        }
        if let Value::Choice(choice) = &code {
            if choice.list == list {
                return Ok(code);
            }
        }
        let unrecognized = |code: String| MigrationError::UnrecognizedEnumerationCode {
            list: list.to_string(),
            code,
        };
        let raw = code.code().ok_or_else(|| unrecognized(format!("{code:?}")))?;
        let name = self
            .lists
            .get(list)
            .and_then(|codes| codes.get(&raw))
            .ok_or_else(|| unrecognized(raw.clone()))?;
        Ok(Value::Choice(Choice {
            list: list.to_string(),
            value: raw,
            name: name.clone(),
        }))
    }
}

/// Source of the current time for rows synthesized during migration.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Partners known to the target database.
pub trait PartnerDirectory {
    fn contains(&self, id: i64) -> Result<bool, MigrationError>;
    fn insert(&mut self, partner: Entity) -> Result<(), MigrationError>;
}

/// In-memory [`PartnerDirectory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryPartners {
    partners: BTreeMap<i64, Entity>,
}

impl MemoryPartners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<&Entity> {
        self.partners.get(&id)
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }
}

impl PartnerDirectory for MemoryPartners {
    fn contains(&self, id: i64) -> Result<bool, MigrationError> {
        Ok(self.partners.contains_key(&id))
    }

    fn insert(&mut self, partner: Entity) -> Result<(), MigrationError> {
        let id = partner
            .id()
            .ok_or_else(|| MigrationError::Lookup("partner without id".into()))?;
        self.partners.insert(id, partner);
        Ok(())
    }
}

/// A reference that could not be resolved and was replaced by a
/// synthesized placeholder entity.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedReferenceRecovered {
    /// Model of the placeholder.
    pub model: String,
    /// Legacy id that was referenced.
    pub id: i64,
    /// Kind of the row holding the reference.
    pub referenced_by: String,
}

/// The injected lookup functions of one import session.
pub struct Lookups {
    pub site: SiteConfig,
    pub localizer: Box<dyn Localizer>,
    pub content_types: Box<dyn ContentTypeRemapper>,
    pub choices: Box<dyn ChoiceResolver>,
    pub clock: Box<dyn Clock>,
}

impl Lookups {
    /// Lookups built from a configuration file, using the system clock.
    pub fn from_config(config: &NoiConfig) -> Self {
        let content_types = config
            .content_types
            .iter()
            .filter_map(|(id, model)| match id.parse::<i64>() {
                Ok(id) => Some((id, model.clone())),
                Err(_) => {
                    tracing::warn!(content_type = %id, "ignoring non-numeric content type id");
                    None
                }
            })
            .collect();
        Self {
            site: config.site.clone(),
            localizer: Box::new(SiteLocalizer::new(config.site.languages.clone())),
            content_types: Box::new(ContentTypeTable {
                models: content_types,
            }),
            choices: Box::new(ChoiceLists::from_lists(config.choice_lists())),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_choices(mut self, choices: impl ChoiceResolver + 'static) -> Self {
        self.choices = Box::new(choices);
        self
    }

    pub fn with_content_types(mut self, content_types: impl ContentTypeRemapper + 'static) -> Self {
        self.content_types = Box::new(content_types);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

impl Default for Lookups {
    fn default() -> Self {
        Self::from_config(&NoiConfig::default())
    }
}

/// Everything a constructor may consult while building one row.
///
/// The context only borrows the session's state; constructors cannot keep
/// it beyond their own invocation.
pub struct ImportContext<'a> {
    lookups: &'a Lookups,
    partners: &'a mut dyn PartnerDirectory,
    recovered: &'a mut Vec<UnresolvedReferenceRecovered>,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        lookups: &'a Lookups,
        partners: &'a mut dyn PartnerDirectory,
        recovered: &'a mut Vec<UnresolvedReferenceRecovered>,
    ) -> Self {
        Self {
            lookups,
            partners,
            recovered,
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.lookups.site
    }

    pub fn localize(&self, base: &str, value: Value) -> Fields {
        self.lookups.localizer.localize(base, value)
    }

    pub fn localized_names(&self, base: &str) -> Vec<String> {
        self.lookups.localizer.localized_names(base)
    }

    pub fn resolve_choice(&self, list: &str, code: Value) -> Result<Value, MigrationError> {
        self.lookups.choices.resolve(list, code)
    }

    pub fn remap_content_type(&self, legacy_id: i64) -> Option<&str> {
        self.lookups.content_types.remap(legacy_id)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.lookups.clock.now()
    }

    /// Resolve a partner id, creating a placeholder partner named after the
    /// id when the target has none.
    pub fn partner_or_placeholder(
        &mut self,
        id: i64,
        referenced_by: &str,
    ) -> Result<i64, MigrationError> {
        if self.partners.contains(id)? {
            return Ok(id);
        }
        let model = self.lookups.site.partner_model.clone();
        let mut fields = Fields::new();
        fields.insert("id".into(), Value::Int(id));
        fields.insert("name".into(), Value::Text(id.to_string()));
        self.partners.insert(Entity::new(&model, fields))?;
        tracing::warn!(
            model = %model,
            id,
            referenced_by,
            "created placeholder for missing partner"
        );
        self.recovered.push(UnresolvedReferenceRecovered {
            model,
            id,
            referenced_by: referenced_by.to_string(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localizer() -> SiteLocalizer {
        SiteLocalizer::new(vec!["en".into(), "de".into(), "fr".into()])
    }

    #[test]
    fn localize_list_positionally() {
        let fields = localizer().localize(
            "name",
            Value::List(vec!["Tools".into(), "Werkzeuge".into(), "Outils".into()]),
        );
        assert_eq!(fields["name"], Value::from("Tools"));
        assert_eq!(fields["name_de"], Value::from("Werkzeuge"));
        assert_eq!(fields["name_fr"], Value::from("Outils"));
    }

    #[test]
    fn localize_scalar_and_short_lists() {
        let fields = localizer().localize("name", Value::from("Tools"));
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["name"], Value::from("Tools"));
        assert_eq!(fields["name_fr"], Value::from(""));

        let fields = localizer().localize("name", Value::Null);
        assert!(fields.values().all(|v| *v == Value::from("")));

        let fields = localizer().localize(
            "name",
            Value::List(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        );
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn resolve_choice_codes() {
        let choices = ChoiceLists::new().with("tickets.TicketStates", &[("2", "todo")]);
        let resolved = choices
            .resolve("tickets.TicketStates", Value::from("2"))
            .unwrap();
        let Value::Choice(choice) = &resolved else {
            panic!("expected a choice, got {resolved:?}");
        };
        assert_eq!(choice.name, "todo");
        assert_eq!(choice.value, "2");

        // Integer codes and resolved values are accepted too.
        assert_eq!(
            choices.resolve("tickets.TicketStates", Value::Int(2)).unwrap(),
            resolved
        );
        assert_eq!(
            choices
                .resolve("tickets.TicketStates", resolved.clone())
                .unwrap(),
            resolved
        );
        assert_eq!(
            choices.resolve("tickets.TicketStates", Value::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn unknown_code_is_reported() {
        let choices = ChoiceLists::new().with("tickets.TicketStates", &[("2", "todo")]);
        assert_eq!(
            choices.resolve("tickets.TicketStates", Value::from("99")),
            Err(MigrationError::UnrecognizedEnumerationCode {
                list: "tickets.TicketStates".into(),
                code: "99".into(),
            })
        );
        assert!(choices.resolve("tickets.Ratings", Value::from("2")).is_err());
    }

    #[test]
    fn placeholder_created_once() {
        let lookups = Lookups::default();
        let mut partners = MemoryPartners::new();
        let mut recovered = Vec::new();
        let mut ctx = ImportContext::new(&lookups, &mut partners, &mut recovered);

        assert_eq!(ctx.partner_or_placeholder(3, "tickets.interest").unwrap(), 3);
        assert_eq!(ctx.partner_or_placeholder(3, "tickets.interest").unwrap(), 3);

        assert_eq!(partners.len(), 1);
        assert_eq!(partners.get(3).unwrap().get("name"), Some(&Value::from("3")));
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].model, "contacts.partner");
    }

    #[test]
    fn lookups_from_config_skip_bad_content_types() {
        let mut config = NoiConfig::default();
        config.content_types.insert("17".into(), "tickets.ticket".into());
        config.content_types.insert("x".into(), "ignored".into());
        let lookups = Lookups::from_config(&config);
        assert_eq!(lookups.content_types.remap(17), Some("tickets.ticket"));
        assert_eq!(lookups.content_types.remap(18), None);
    }
}

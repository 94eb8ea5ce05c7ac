use std::collections::BTreeMap;

use crate::config::TICKET_STATES;
use crate::context::{ImportContext, Localizer};
use crate::error::MigrationError;
use crate::row::{Entity, Fields, Row};
use crate::version::SchemaVersion;

/// How a declared field is turned into entity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Copied as is.
    Plain,
    /// Multilingual; expanded to one field per site language.
    Babel,
    /// Enumeration code resolved through the named choice list.
    Choice(&'static str),
}

/// One declared field of a model.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn plain(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Plain,
    }
}

const fn babel(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Babel,
    }
}

const fn choice(name: &'static str, list: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Choice(list),
    }
}

/// Declared fields of one model of the running schema.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub model: &'static str,
    pub fields: &'static [FieldDef],
}

impl ModelSchema {
    /// Build an entity from a row of this model's current shape.
    ///
    /// The row must carry exactly the declared fields. Babel fields are
    /// expanded and choice fields resolved.
    pub fn instantiate(&self, row: Row, ctx: &ImportContext<'_>) -> Result<Entity, MigrationError> {
        row.check_exact(self.fields.iter().map(|f| f.name))?;
        let mut fields = Fields::new();
        for (name, value) in row.fields {
            let def = self
                .fields
                .iter()
                .find(|f| f.name == name)
                .map_or(FieldKind::Plain, |f| f.kind);
            match def {
                FieldKind::Plain => {
                    fields.insert(name, value);
                }
                FieldKind::Babel => fields.extend(ctx.localize(&name, value)),
                FieldKind::Choice(list) => {
                    fields.insert(name, ctx.resolve_choice(list, value)?);
                }
            }
        }
        Ok(Entity::new(self.model, fields))
    }

    /// The exact field names an entity of this model carries.
    pub fn expanded_fields(&self, localizer: &dyn Localizer) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .iter()
            .flat_map(|f| match f.kind {
                FieldKind::Babel => localizer.localized_names(f.name),
                _ => vec![f.name.to_string()],
            })
            .collect();
        names.sort();
        names
    }
}

/// The models of the running schema that this crate knows how to build.
///
/// Kinds that are not declared here belong to the loader and are passed
/// through unchanged.
#[derive(Debug, Clone, Default)]
pub struct CurrentSchema {
    models: BTreeMap<&'static str, ModelSchema>,
}

impl CurrentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: ModelSchema) -> Self {
        self.models.insert(model.model, model);
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }

    /// Build an entity from a current-shape row. Undeclared kinds pass
    /// through field for field.
    pub fn instantiate(&self, row: Row, ctx: &ImportContext<'_>) -> Result<Entity, MigrationError> {
        match self.models.get(row.kind.as_str()) {
            Some(model) => model.instantiate(row, ctx),
            None => {
                tracing::trace!(kind = %row.kind, "no declared shape, passing row through");
                Ok(Entity::new(&row.kind, row.fields))
            }
        }
    }

    /// The Noi schema at release 2016.12.0.
    pub fn noi() -> Self {
        Self::noi_at(&SchemaVersion::from_components(&[2016, 12, 0]))
    }

    /// The Noi models whose shape at `release` is final. Models that a
    /// later migration step still reshapes are left undeclared and pass
    /// through.
    pub fn noi_at(release: &SchemaVersion) -> Self {
        NOI_MODELS
            .iter()
            .filter(|(since, _)| *release >= SchemaVersion::from_components(since))
            .fold(Self::new(), |schema, (_, model)| schema.with_model(model.clone()))
    }
}

/// Declared models with the release their current shape appeared in.
const NOI_MODELS: &[([u32; 3], ModelSchema)] = &[
    ([0, 0, 2], TICKET),
    ([0, 0, 2], TOPIC),
    ([0, 0, 2], TOPIC_GROUP),
    ([0, 0, 2], INTEREST),
    ([0, 0, 2], COMPETENCE),
    ([0, 0, 3], SITE),
    ([0, 0, 3], FACULTY),
    ([2016, 12, 0], VOTE),
];

const SITE: ModelSchema = ModelSchema {
    model: "tickets.site",
    fields: &[plain("id"), plain("name"), plain("remark")],
};

const TICKET: ModelSchema = ModelSchema {
    model: "tickets.ticket",
    fields: &[
        plain("id"),
        plain("modified"),
        plain("created"),
        plain("closed"),
        plain("private"),
        plain("planned_time"),
        plain("project_id"),
        plain("site_id"),
        plain("topic_id"),
        plain("nickname"),
        plain("summary"),
        plain("description"),
        plain("upgrade_notes"),
        plain("ticket_type_id"),
        plain("duplicate_of_id"),
        plain("reported_for_id"),
        plain("fixed_for_id"),
        plain("assigned_to_id"),
        plain("reporter_id"),
        choice("state", TICKET_STATES),
        plain("waiting_for"),
        plain("deadline"),
        plain("priority"),
        plain("feedback"),
        plain("standby"),
        plain("faculty_id"),
    ],
};

const TOPIC: ModelSchema = ModelSchema {
    model: "topics.topic",
    fields: &[
        plain("id"),
        plain("ref"),
        babel("name"),
        babel("description"),
        plain("topic_group_id"),
    ],
};

const TOPIC_GROUP: ModelSchema = ModelSchema {
    model: "topics.topicgroup",
    fields: &[plain("id"), babel("name"), plain("description")],
};

const INTEREST: ModelSchema = ModelSchema {
    model: "topics.interest",
    fields: &[plain("id"), plain("topic_id"), plain("partner_id")],
};

const FACULTY: ModelSchema = ModelSchema {
    model: "faculties.faculty",
    fields: &[
        plain("id"),
        plain("seqno"),
        plain("parent_id"),
        babel("name"),
        plain("affinity"),
    ],
};

const COMPETENCE: ModelSchema = ModelSchema {
    model: "faculties.competence",
    fields: &[
        plain("id"),
        plain("seqno"),
        plain("user_id"),
        plain("faculty_id"),
        plain("affinity"),
        plain("topic_id"),
    ],
};

const VOTE: ModelSchema = ModelSchema {
    model: "votes.vote",
    fields: &[
        plain("id"),
        plain("user_id"),
        plain("created"),
        plain("votable_id"),
        plain("nickname"),
    ],
};

//! The migration chain of Lino Noi.
//!
//! | From      | To        | Change                                            |
//! |-----------|-----------|---------------------------------------------------|
//! | 0.0.1     | 0.0.2     | products become topics, interests point to partners |
//! | 0.0.2     | 0.0.3     | faculties lose `ref` and `product_cat`, sites lose `partner` |
//! | 0.0.3     | 1.0.1     | no schema change                                  |
//! | 1.0.1     | 1.0.2     | deployments and milestones move to `deploy`       |
//! | 1.0.2     | 2016.12.0 | stars become votes                                |

use crate::config::{SiteConfig, TICKET_STATES};
use crate::context::ImportContext;
use crate::engine::{MigrationEngine, MigrationStep, RowMigration};
use crate::error::MigrationError;
use crate::row::{Row, Value};
use crate::schema::CurrentSchema;
use crate::version::SchemaVersion;

type Rows = Result<Vec<Row>, MigrationError>;

/// Model that stars are converted into votes for.
const VOTABLE_MODEL: &str = "tickets.ticket";

/// All Noi migration steps, oldest first.
pub fn noi_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![
        Box::new(ProductsToTopics),
        Box::new(FacultyCleanup),
        Box::new(ReleaseBump {
            from: [0, 0, 3],
            to: [1, 0, 1],
        }),
        Box::new(DeployPlugin),
        Box::new(StarsToVotes),
    ]
}

/// A validated engine for `site`, targeting the site's current version.
pub fn noi_engine(site: &SiteConfig) -> Result<MigrationEngine, MigrationError> {
    let mut engine = MigrationEngine::new(site.current_version.clone())
        .with_site(site.clone())
        .with_schema(CurrentSchema::noi_at(&site.current_version));
    for step in noi_steps() {
        engine.register(step);
    }
    engine.validate_chain()?;
    Ok(engine)
}

// ── 0.0.1 → 0.0.2 ────────────────────────────────────────────────────

/// Products become topics. `Interest.product` becomes `Interest.topic`, and
/// `Interest.site.partner` becomes `Interest.partner`, creating the partner
/// when it is missing.
pub struct ProductsToTopics;

const TICKET_V1: &[&str] = &[
    "id",
    "modified",
    "created",
    "closed",
    "private",
    "planned_time",
    "project_id",
    "site_id",
    "product_id",
    "nickname",
    "summary",
    "description",
    "upgrade_notes",
    "ticket_type_id",
    "duplicate_of_id",
    "reported_for_id",
    "fixed_for_id",
    "assigned_to_id",
    "reporter_id",
    "state",
    "waiting_for",
    "deadline",
    "priority",
    "feedback",
    "standby",
    "faculty_id",
];

impl MigrationStep for ProductsToTopics {
    fn source_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[0, 0, 1])
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[0, 0, 2])
    }

    fn summary(&self) -> &str {
        "convert products to topics"
    }

    fn install(&self, _site: &SiteConfig) -> Vec<RowMigration> {
        vec![
            RowMigration::exact("tickets.interest", &["id", "product_id", "site_id"], interest_to_topics),
            RowMigration::exact("products.productcat", &["id", "name", "description"], product_cat_to_topic_group),
            RowMigration::exact(
                "products.product",
                &["id", "ref", "name", "description", "cat_id"],
                product_to_topic,
            ),
            RowMigration::exact("tickets.ticket", TICKET_V1, ticket_product_to_topic),
            RowMigration::exact(
                "faculties.competence",
                &["id", "seqno", "user_id", "faculty_id", "affinity", "product_id"],
                competence_product_to_topic,
            ),
            RowMigration::exact(
                "faculties.faculty",
                &["id", "ref", "parent_id", "name", "affinity", "product_cat_id"],
                faculty_add_seqno,
            ),
        ]
    }
}

fn interest_to_topics(mut row: Row, ctx: &mut ImportContext<'_>) -> Rows {
    let site_id = row.take_int("site_id")?;
    let partner_id = ctx.partner_or_placeholder(site_id, &row.kind)?;
    row.rename("product_id", "topic_id")?;
    row.set("partner_id", partner_id);
    Ok(vec![row.retag("topics.interest")])
}

fn product_cat_to_topic_group(row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    Ok(vec![row.retag("topics.topicgroup")])
}

fn product_to_topic(mut row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    row.rename("cat_id", "topic_group_id")?;
    Ok(vec![row.retag("topics.topic")])
}

fn ticket_product_to_topic(mut row: Row, ctx: &mut ImportContext<'_>) -> Rows {
    row.rename("product_id", "topic_id")?;
    let state = row.take("state")?;
    row.set("state", ctx.resolve_choice(TICKET_STATES, state)?);
    Ok(vec![row])
}

fn competence_product_to_topic(mut row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    row.rename("product_id", "topic_id")?;
    Ok(vec![row])
}

fn faculty_add_seqno(mut row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    row.set("seqno", Value::Null);
    Ok(vec![row])
}

// ── 0.0.2 → 0.0.3 ────────────────────────────────────────────────────

/// Faculties lose their reference and product category; sites lose their
/// partner.
pub struct FacultyCleanup;

impl MigrationStep for FacultyCleanup {
    fn source_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[0, 0, 2])
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[0, 0, 3])
    }

    fn summary(&self) -> &str {
        "drop faculty reference, category and site partner"
    }

    fn install(&self, _site: &SiteConfig) -> Vec<RowMigration> {
        vec![
            RowMigration::exact(
                "faculties.faculty",
                &["id", "ref", "seqno", "parent_id", "name", "affinity", "product_cat_id"],
                faculty_drop_ref,
            ),
            RowMigration::exact("tickets.site", &["id", "partner_id", "name", "remark"], site_drop_partner),
        ]
    }
}

fn faculty_drop_ref(mut row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    row.drop_field("ref")?;
    row.drop_field("product_cat_id")?;
    Ok(vec![row])
}

fn site_drop_partner(mut row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    row.drop_field("partner_id")?;
    Ok(vec![row])
}

// ── releases without schema changes ─────────────────────────────────

/// Links two consecutive releases whose data shapes are identical.
pub struct ReleaseBump {
    pub from: [u32; 3],
    pub to: [u32; 3],
}

impl MigrationStep for ReleaseBump {
    fn source_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&self.from)
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&self.to)
    }

    fn summary(&self) -> &str {
        "no schema changes"
    }

    fn install(&self, _site: &SiteConfig) -> Vec<RowMigration> {
        Vec::new()
    }
}

// ── 1.0.1 → 1.0.2 ────────────────────────────────────────────────────

/// Deployments and milestones move from `tickets` to the `deploy` plugin.
/// Sites without that plugin drop them.
pub struct DeployPlugin;

impl MigrationStep for DeployPlugin {
    fn source_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[1, 0, 1])
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[1, 0, 2])
    }

    fn summary(&self) -> &str {
        "move deployments and milestones to deploy"
    }

    fn install(&self, site: &SiteConfig) -> Vec<RowMigration> {
        if site.is_installed("deploy") {
            vec![
                RowMigration::any("tickets.deployment", move_deployment),
                RowMigration::any("tickets.milestone", move_milestone),
            ]
        } else {
            vec![
                RowMigration::any("tickets.deployment", drop_row),
                RowMigration::any("tickets.milestone", drop_row),
            ]
        }
    }
}

fn move_deployment(row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    Ok(vec![row.retag("deploy.deployment")])
}

fn move_milestone(row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    Ok(vec![row.retag("deploy.milestone")])
}

fn drop_row(_row: Row, _ctx: &mut ImportContext<'_>) -> Rows {
    Ok(Vec::new())
}

// ── 1.0.2 → 2016.12.0 ────────────────────────────────────────────────

/// Stars become votes.
pub struct StarsToVotes;

impl MigrationStep for StarsToVotes {
    fn source_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[1, 0, 2])
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::from_components(&[2016, 12, 0])
    }

    fn summary(&self) -> &str {
        "convert stars to votes"
    }

    fn install(&self, _site: &SiteConfig) -> Vec<RowMigration> {
        vec![RowMigration::exact(
            "stars.star",
            &["id", "user_id", "owner_type_id", "owner_id", "nickname"],
            star_to_vote,
        )]
    }
}

fn star_to_vote(mut row: Row, ctx: &mut ImportContext<'_>) -> Rows {
    if let Some(owner_type) = row.take_opt_int("owner_type_id")? {
        if let Some(model) = ctx.remap_content_type(owner_type) {
            if model != VOTABLE_MODEL {
                tracing::warn!(
                    star = ?row.get("id"),
                    owner_model = model,
                    "dropping star on a non-votable owner"
                );
                return Ok(Vec::new());
            }
        }
    }
    row.rename("owner_id", "votable_id")?;
    let created = ctx.now().format("%Y-%m-%d %H:%M:%S").to_string();
    row.set("created", created);
    Ok(vec![row.retag("votes.vote")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Lookups, MemoryPartners};

    fn run_step(
        step: &dyn MigrationStep,
        site: &SiteConfig,
        row: Row,
    ) -> Result<Vec<Row>, MigrationError> {
        let lookups = Lookups::default();
        let mut partners = MemoryPartners::new();
        let mut recovered = Vec::new();
        let mut ctx = ImportContext::new(&lookups, &mut partners, &mut recovered);
        let migrations = step.install(site);
        let migration = migrations
            .iter()
            .find(|m| m.kind == row.kind)
            .expect("step handles the row kind");
        migration.migrate(row, &mut ctx)
    }

    #[test]
    fn noi_chain_is_contiguous() {
        let engine = noi_engine(&SiteConfig::default()).unwrap();
        let steps: Vec<String> = engine
            .registered_steps()
            .into_iter()
            .map(|(from, to)| format!("{from}->{to}"))
            .collect();
        assert_eq!(
            steps,
            vec![
                "0.0.1->0.0.2",
                "0.0.2->0.0.3",
                "0.0.3->1.0.1",
                "1.0.1->1.0.2",
                "1.0.2->2016.12.0",
            ]
        );
    }

    #[test]
    fn disabled_assignment_step_is_not_registered() {
        let steps = noi_steps();
        let latest = SchemaVersion::from_components(&[2016, 12, 0]);
        assert!(steps.iter().all(|s| s.source_version() != latest));

        let mut site = SiteConfig::default();
        site.current_version = SchemaVersion::from_components(&[2016, 12, 1]);
        assert!(matches!(
            noi_engine(&site),
            Err(MigrationError::GapInChain { missing }) if missing == latest
        ));
    }

    #[test]
    fn earlier_running_release_stops_the_chain() {
        let mut site = SiteConfig::default();
        site.current_version = SchemaVersion::from_components(&[1, 0, 2]);
        let engine = noi_engine(&site).unwrap();

        assert_eq!(engine.chain().count(), 4);
        let path = engine.plan(&SchemaVersion::from_components(&[0, 0, 1])).unwrap();
        assert_eq!(path.last().map(|s| s.target_version()), Some(site.current_version.clone()));
        assert!(engine.schema().model("votes.vote").is_none());
    }

    #[test]
    fn faculty_cleanup_drops_fields() {
        let row = Row::new("faculties.faculty")
            .with("id", 1)
            .with("ref", "dev")
            .with("seqno", 3)
            .with("parent_id", Value::Null)
            .with("name", "Development")
            .with("affinity", 100)
            .with("product_cat_id", 2);
        let out = run_step(&FacultyCleanup, &SiteConfig::default(), row).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].get("ref").is_none());
        assert!(out[0].get("product_cat_id").is_none());
        assert_eq!(out[0].get("seqno"), Some(&Value::Int(3)));
    }

    #[test]
    fn deploy_rows_follow_plugin() {
        let row = Row::new("tickets.milestone").with("id", 4).with("label", "1.0");

        let out = run_step(&DeployPlugin, &SiteConfig::default(), row.clone()).unwrap();
        assert_eq!(out[0].kind, "deploy.milestone");
        assert_eq!(out[0].fields, row.fields);

        let mut site = SiteConfig::default();
        site.plugins.remove("deploy");
        assert!(run_step(&DeployPlugin, &site, row).unwrap().is_empty());
    }

    #[test]
    fn release_bump_installs_nothing() {
        let step = ReleaseBump {
            from: [0, 0, 3],
            to: [1, 0, 1],
        };
        assert!(step.install(&SiteConfig::default()).is_empty());
        assert!(step.source_version() < step.target_version());
    }
}

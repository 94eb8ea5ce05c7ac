//! Who can work on a ticket.
//!
//! A user may be assigned to a ticket when one of their competences
//! covers it: the competence names the ticket's topic (if the ticket has
//! one) and a faculty on the parental line of the ticket's faculty (if
//! the ticket has one).

use std::collections::{BTreeMap, BTreeSet};

use noi_migrate::{Entity, Value};

use crate::db::{ImportDb, ImportError};
use crate::traits::StateStore;

pub const TICKET_MODEL: &str = "tickets.ticket";
pub const FACULTY_MODEL: &str = "faculties.faculty";
pub const COMPETENCE_MODEL: &str = "faculties.competence";

/// Affinity of a competence or faculty that does not state one.
pub const MAX_WEIGHT: i64 = 100;

/// Ticket states in which anybody may work on a ticket.
pub const ACTIVE_STATES: &[&str] = &["new", "talk", "todo", "sticky", "ready"];

/// A user whose competence covers a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignableWorker {
    pub user_id: i64,
    /// The best matching competence of the user.
    pub competence_id: i64,
    pub affinity: i64,
}

/// Whether `ticket` can be worked on. Standby and closed tickets never
/// can; tickets in an inactive state only by triagers.
pub fn is_workable(ticket: &Entity, triager: bool) -> bool {
    if is_set(ticket.get("standby")) || is_set(ticket.get("closed")) {
        return false;
    }
    triager || is_active(ticket.get("state"))
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Int(n)) => *n != 0,
        Some(Value::Text(s)) => !s.is_empty(),
        _ => false,
    }
}

fn is_active(state: Option<&Value>) -> bool {
    match state {
        Some(Value::Choice(choice)) => ACTIVE_STATES.contains(&choice.name.as_str()),
        _ => false,
    }
}

fn int_field(entity: &Entity, name: &str) -> Option<i64> {
    entity.get(name).and_then(Value::as_int)
}

impl<S: StateStore> ImportDb<S> {
    /// The faculty `faculty_id` and all its ancestors, root first.
    pub fn parental_line(&self, faculty_id: i64) -> Result<Vec<Entity>, ImportError<S::Error>> {
        let mut line = Vec::new();
        let mut seen = BTreeSet::new();
        let mut next = Some(faculty_id);
        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(ImportError::FacultyCycle { id: faculty_id });
            }
            let faculty = self
                .load(FACULTY_MODEL, id)?
                .ok_or_else(|| ImportError::NotFound {
                    model: FACULTY_MODEL.to_string(),
                    id,
                })?;
            next = int_field(&faculty, "parent_id");
            line.push(faculty);
        }
        line.reverse();
        Ok(line)
    }

    /// Users who may be assigned to ticket `ticket_id`, most eager first.
    ///
    /// Each user appears once, with the matching competence of highest
    /// affinity. A competence without affinity inherits its faculty's.
    pub fn assignable_workers(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<AssignableWorker>, ImportError<S::Error>> {
        let ticket = self
            .load(TICKET_MODEL, ticket_id)?
            .ok_or_else(|| ImportError::NotFound {
                model: TICKET_MODEL.to_string(),
                id: ticket_id,
            })?;
        let topic = int_field(&ticket, "topic_id");
        let faculties: Option<BTreeSet<i64>> = match int_field(&ticket, "faculty_id") {
            Some(id) => Some(
                self.parental_line(id)?
                    .iter()
                    .filter_map(Entity::id)
                    .collect(),
            ),
            None => None,
        };

        let mut best: BTreeMap<i64, AssignableWorker> = BTreeMap::new();
        for competence in self.entities(COMPETENCE_MODEL)? {
            let (Some(competence_id), Some(user_id)) =
                (competence.id(), int_field(&competence, "user_id"))
            else {
                continue;
            };
            let faculty = int_field(&competence, "faculty_id");
            if topic.is_some() && int_field(&competence, "topic_id") != topic {
                continue;
            }
            if let Some(line) = &faculties {
                if !faculty.is_some_and(|f| line.contains(&f)) {
                    continue;
                }
            }
            let affinity = match int_field(&competence, "affinity") {
                Some(affinity) => affinity,
                None => self.faculty_affinity(faculty)?,
            };
            let candidate = AssignableWorker {
                user_id,
                competence_id,
                affinity,
            };
            if best.get(&user_id).map_or(true, |current| affinity > current.affinity) {
                best.insert(user_id, candidate);
            }
        }

        let mut workers: Vec<AssignableWorker> = best.into_values().collect();
        workers.sort_by(|a, b| b.affinity.cmp(&a.affinity).then(a.user_id.cmp(&b.user_id)));
        tracing::debug!(ticket = ticket_id, workers = workers.len(), "assignable workers");
        Ok(workers)
    }

    fn faculty_affinity(&self, faculty: Option<i64>) -> Result<i64, ImportError<S::Error>> {
        let Some(id) = faculty else {
            return Ok(MAX_WEIGHT);
        };
        Ok(self
            .load(FACULTY_MODEL, id)?
            .and_then(|f| int_field(&f, "affinity"))
            .unwrap_or(MAX_WEIGHT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use noi_migrate::{Choice, Fields, NoiConfig};

    fn entity(model: &str, fields: &[(&str, Value)]) -> Entity {
        let fields: Fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Entity::new(model, fields)
    }

    fn state(name: &str) -> Value {
        Value::Choice(Choice {
            list: "tickets.TicketStates".into(),
            value: "0".into(),
            name: name.into(),
        })
    }

    fn faculty(id: i64, parent: Option<i64>, affinity: i64) -> Entity {
        entity(
            FACULTY_MODEL,
            &[
                ("id", Value::Int(id)),
                ("parent_id", parent.into()),
                ("affinity", Value::Int(affinity)),
            ],
        )
    }

    fn competence(id: i64, user: i64, faculty: i64, topic: Option<i64>, affinity: Option<i64>) -> Entity {
        entity(
            COMPETENCE_MODEL,
            &[
                ("id", Value::Int(id)),
                ("user_id", Value::Int(user)),
                ("faculty_id", Value::Int(faculty)),
                ("topic_id", topic.into()),
                ("affinity", affinity.into()),
            ],
        )
    }

    fn ticket(id: i64, topic: Option<i64>, faculty: Option<i64>) -> Entity {
        entity(
            TICKET_MODEL,
            &[
                ("id", Value::Int(id)),
                ("topic_id", topic.into()),
                ("faculty_id", faculty.into()),
                ("state", state("todo")),
                ("standby", Value::Bool(false)),
                ("closed", Value::Bool(false)),
            ],
        )
    }

    /// Faculties: 1 "development" > 2 "rust" > 3 "async"; 4 "design" apart.
    fn db(entities: &[Entity]) -> ImportDb<MemoryStore> {
        let mut db = ImportDb::from_config(MemoryStore::new(), &NoiConfig::default()).unwrap();
        for e in [
            faculty(1, None, 50),
            faculty(2, Some(1), 80),
            faculty(3, Some(2), 90),
            faculty(4, None, 70),
        ]
        .iter()
        .chain(entities)
        {
            db.save(e).unwrap();
        }
        db
    }

    fn users(workers: &[AssignableWorker]) -> Vec<i64> {
        workers.iter().map(|w| w.user_id).collect()
    }

    #[test]
    fn parental_line_starts_at_root() {
        let db = db(&[]);
        let ids: Vec<_> = db.parental_line(3).unwrap().iter().filter_map(Entity::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(db.parental_line(4).unwrap().len(), 1);
    }

    #[test]
    fn parental_line_rejects_cycles() {
        let mut db = db(&[]);
        db.save(&faculty(5, Some(6), 10)).unwrap();
        db.save(&faculty(6, Some(5), 10)).unwrap();
        assert!(matches!(db.parental_line(5), Err(ImportError::FacultyCycle { id: 5 })));
    }

    #[test]
    fn workers_follow_parental_line() {
        let db = db(&[
            ticket(1, None, Some(2)),
            competence(1, 10, 1, None, Some(20)),
            competence(2, 11, 2, None, Some(60)),
            competence(3, 12, 3, None, Some(90)),
            competence(4, 13, 4, None, Some(99)),
        ]);

        let workers = db.assignable_workers(1).unwrap();

        // Child faculty 3 and unrelated faculty 4 are not on the line of 2.
        assert_eq!(users(&workers), vec![11, 10]);
        assert_eq!(workers[0].competence_id, 2);
    }

    #[test]
    fn workers_must_match_topic() {
        let db = db(&[
            ticket(1, Some(7), None),
            competence(1, 10, 1, Some(7), Some(20)),
            competence(2, 11, 4, Some(8), Some(90)),
            competence(3, 12, 2, None, Some(90)),
        ]);

        assert_eq!(users(&db.assignable_workers(1).unwrap()), vec![10]);
    }

    #[test]
    fn topic_and_faculty_must_match_the_same_competence() {
        let db = db(&[
            ticket(1, Some(7), Some(2)),
            competence(1, 10, 4, Some(7), Some(50)),
            competence(2, 10, 2, Some(8), Some(50)),
            competence(3, 11, 1, Some(7), Some(50)),
        ]);

        assert_eq!(users(&db.assignable_workers(1).unwrap()), vec![11]);
    }

    #[test]
    fn users_appear_once_with_best_affinity() {
        let db = db(&[
            ticket(1, None, None),
            competence(1, 10, 1, None, Some(30)),
            competence(2, 10, 4, None, Some(80)),
            // No own affinity: inherits faculty 3's.
            competence(3, 11, 3, None, None),
        ]);

        let workers = db.assignable_workers(1).unwrap();

        assert_eq!(
            workers,
            vec![
                AssignableWorker {
                    user_id: 11,
                    competence_id: 3,
                    affinity: 90,
                },
                AssignableWorker {
                    user_id: 10,
                    competence_id: 2,
                    affinity: 80,
                },
            ]
        );
    }

    #[test]
    fn unknown_ticket_is_not_found() {
        let db = db(&[]);
        assert!(matches!(
            db.assignable_workers(42),
            Err(ImportError::NotFound { id: 42, .. })
        ));
    }

    #[test]
    fn workable_tickets() {
        let open = ticket(1, None, None);
        assert!(is_workable(&open, false));

        let standby = entity(TICKET_MODEL, &[("standby", Value::Bool(true)), ("state", state("todo"))]);
        assert!(!is_workable(&standby, true));

        let closed = entity(TICKET_MODEL, &[("closed", Value::Bool(true)), ("state", state("new"))]);
        assert!(!is_workable(&closed, false));

        let sleeping = entity(TICKET_MODEL, &[("state", state("sleeping"))]);
        assert!(!is_workable(&sleeping, false));
        assert!(is_workable(&sleeping, true));
    }
}

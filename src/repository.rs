use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::CachedCollection;
use crate::jira::{JiraEndpoint, JiraError};
use crate::model::{dedupe_by_key, ChildIssue, Initiative, KeyedIssue, Plan, Ticket};
use crate::runner::QueryRunner;

fn issue_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9]+$").expect("issue key pattern is valid")
    })
}

pub fn is_valid_issue_key(key: &str) -> bool {
    issue_key_pattern().is_match(key)
}

#[derive(Debug)]
pub struct IssueRepository<E> {
    runner: QueryRunner<E>,
    initiatives: CachedCollection<Initiative>,
    plans: CachedCollection<Arc<Plan>>,
    reconciled: bool,
    ticket_to_initiative: OnceCell<HashMap<String, String>>,
    ticket_to_plan: OnceCell<HashMap<String, String>>,
}

impl<E: JiraEndpoint> IssueRepository<E> {
    pub fn new(runner: QueryRunner<E>) -> Self {
        let metrics = runner.metrics().clone();
        Self {
            initiatives: CachedCollection::new("initiatives", metrics.clone()),
            plans: CachedCollection::new("plans", metrics),
            runner,
            reconciled: false,
            ticket_to_initiative: OnceCell::new(),
            ticket_to_plan: OnceCell::new(),
        }
    }

    pub fn runner(&self) -> &QueryRunner<E> {
        &self.runner
    }

    pub fn open_initiatives(&mut self) -> Result<&[Initiative], JiraError> {
        if !self.initiatives.is_loaded() {
            self.invalidate_lookups();
        }

        let runner = &self.runner;
        self.initiatives.get_or_load(|| {
            let initiatives =
                runner.initiatives(runner.queries().months_of_closed_initiatives)?;
            info!("retrieved {} initiatives", initiatives.len());
            Ok::<_, JiraError>(initiatives)
        })
    }

    pub fn open_plans(&mut self) -> Result<(&[Initiative], &[Arc<Plan>]), JiraError> {
        self.open_initiatives()?;

        if !self.plans.is_loaded() {
            self.invalidate_lookups();
            self.reconciled = false;
        }

        let runner = &self.runner;
        self.plans.get_or_load(|| {
            let plans = runner.plans(runner.queries().months_of_closed_plans)?;
            info!("retrieved {} plans", plans.len());
            Ok::<_, JiraError>(plans.into_iter().map(Arc::new).collect())
        })?;

        self.reconcile()?;
        Ok((
            self.initiatives.get().unwrap_or_default(),
            self.plans.get().unwrap_or_default(),
        ))
    }

    /// Expands epics and links plans into initiatives. Safe to call repeatedly:
    /// once reconciled, nothing is fetched or rebuilt until the next reset.
    pub fn reconcile(&mut self) -> Result<(), JiraError> {
        if self.reconciled {
            debug!("hierarchy already reconciled");
            return Ok(());
        }
        let (Some(initiatives), Some(plans)) = (self.initiatives.get(), self.plans.get()) else {
            return Ok(());
        };

        let expanded = self.expand_epics(plans)?;
        let linked = link_plans(initiatives, &expanded);

        self.plans.replace(expanded);
        self.initiatives.replace(linked);
        self.invalidate_lookups();
        self.reconciled = true;
        Ok(())
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    fn expand_epics(&self, plans: &[Arc<Plan>]) -> Result<Vec<Arc<Plan>>, JiraError> {
        let epic_keys: BTreeSet<&str> = plans
            .iter()
            .filter(|plan| !plan.expanded)
            .flat_map(|plan| plan.epics())
            .map(KeyedIssue::key)
            .collect();

        let epic_keys: Vec<String> = epic_keys
            .into_iter()
            .filter(|key| {
                let valid = is_valid_issue_key(key);
                if !valid {
                    warn!(key = *key, "skipping epic with an invalid issue key");
                }
                valid
            })
            .map(ToString::to_string)
            .collect();

        let batch_size = self.runner.queries().epic_batch_size.max(1);
        let mut grandchildren = Vec::new();
        for batch in epic_keys.chunks(batch_size) {
            grandchildren.extend(self.runner.epic_children(batch)?);
        }
        info!("plan grandchildren fetched: {} tickets", grandchildren.len());

        Ok(plans
            .iter()
            .map(|plan| {
                if plan.expanded {
                    return Arc::clone(plan);
                }

                let mut children = plan.children.clone();
                for epic in plan.epics() {
                    children.extend(
                        grandchildren
                            .iter()
                            .filter(|child| child.parent_key.as_deref() == Some(epic.key()))
                            .cloned()
                            .map(ChildIssue::WithParent),
                    );
                }

                Arc::new(Plan {
                    expanded: true,
                    ..Plan::clone(plan).with_children(dedupe_by_key(children))
                })
            })
            .collect())
    }

    pub fn find_ticket_by_key(&self, key: &str) -> Option<(&str, &Ticket)> {
        let initiatives = self.initiatives.get()?;
        for initiative in initiatives {
            for plan in initiative.plans() {
                if let Some(ticket) = plan.tickets().find(|ticket| ticket.key == key) {
                    return Some((initiative.key.as_str(), ticket));
                }
            }
        }
        None
    }

    pub fn plan(&self, key: &str) -> Result<&Plan, JiraError> {
        self.plans
            .get()
            .and_then(|plans| plans.iter().find(|plan| plan.key == key))
            .map(Arc::as_ref)
            .ok_or_else(|| JiraError::NotFound(format!("plan {key}")))
    }

    pub fn leaf_ticket_to_initiative_map(&self) -> &HashMap<String, String> {
        self.ticket_to_initiative.get_or_init(|| {
            let mut map = HashMap::new();
            for initiative in self.initiatives.get().unwrap_or_default() {
                for ticket in initiative.plans().flat_map(Plan::tickets) {
                    map.entry(ticket.key.clone())
                        .or_insert_with(|| initiative.key.clone());
                }
            }
            map
        })
    }

    pub fn leaf_ticket_to_plan_map(&self) -> &HashMap<String, String> {
        self.ticket_to_plan.get_or_init(|| {
            let mut map = HashMap::new();
            for plan in self.plans.get().unwrap_or_default() {
                for ticket in plan.tickets() {
                    map.entry(ticket.key.clone())
                        .or_insert_with(|| plan.key.clone());
                }
            }
            map
        })
    }

    pub fn reset(&mut self) {
        self.initiatives.reset();
        self.plans.reset();
        self.reconciled = false;
        self.invalidate_lookups();
    }

    fn invalidate_lookups(&mut self) {
        self.ticket_to_initiative = OnceCell::new();
        self.ticket_to_plan = OnceCell::new();
    }
}

fn link_plans(initiatives: &[Initiative], plans: &[Arc<Plan>]) -> Vec<Initiative> {
    initiatives
        .iter()
        .map(|initiative| {
            let declared: Vec<&str> = initiative.children.iter().map(KeyedIssue::key).collect();
            for key in &declared {
                if !plans.iter().any(|plan| plan.key == *key) {
                    warn!(
                        initiative = %initiative.key,
                        plan = *key,
                        "declared plan not found among loaded plans"
                    );
                }
            }

            let linked: Vec<ChildIssue> = plans
                .iter()
                .filter(|plan| declared.contains(&plan.key.as_str()))
                .cloned()
                .map(ChildIssue::Plan)
                .collect();

            if linked.is_empty() {
                initiative.clone()
            } else {
                initiative.clone().with_children(linked)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::metrics::Metrics;
    use crate::runner::HierarchyQueries;
    use crate::testing::{epic_child, link, linked_issue, paged, FakeEndpoint};

    const INITIATIVES: &str = "Product Initiative";
    const PLANS: &str = "project = \"PMPLAN\"";
    const EPICS: &str = "parent IN";

    fn repository(endpoint: &FakeEndpoint) -> IssueRepository<&FakeEndpoint> {
        repository_with(endpoint, HierarchyQueries::default())
    }

    fn repository_with(
        endpoint: &FakeEndpoint,
        queries: HierarchyQueries,
    ) -> IssueRepository<&FakeEndpoint> {
        IssueRepository::new(QueryRunner::new(endpoint, queries, Arc::new(Metrics::new())))
    }

    fn single_plan(links: Vec<serde_json::Value>) -> FakeEndpoint {
        FakeEndpoint::new()
            .route(
                INITIATIVES,
                paged(vec![vec![linked_issue(
                    "INIT-1",
                    vec![link("outwardIssue", "PMPLAN-1", "Idea")],
                )]]),
            )
            .route(PLANS, paged(vec![vec![linked_issue("PMPLAN-1", links)]]))
    }

    fn hierarchy() -> FakeEndpoint {
        FakeEndpoint::new()
            .route(
                INITIATIVES,
                paged(vec![vec![
                    linked_issue(
                        "INIT-1",
                        vec![
                            link("outwardIssue", "PMPLAN-1", "Idea"),
                            link("outwardIssue", "PMPLAN-9", "Idea"),
                        ],
                    ),
                    linked_issue("INIT-2", vec![link("outwardIssue", "PMPLAN-2", "Idea")]),
                ]]),
            )
            .route(
                PLANS,
                paged(vec![
                    vec![
                        linked_issue(
                            "PMPLAN-1",
                            vec![
                                link("inwardIssue", "PROJ-1", "Story"),
                                link("inwardIssue", "PROJ-5", "Epic"),
                                link("inwardIssue", "PROJ-3", "Story"),
                                link("inwardIssue", "INIT-1", "Product Initiative"),
                            ],
                        ),
                        linked_issue("PMPLAN-2", vec![link("inwardIssue", "PROJ-3", "Story")]),
                    ],
                    vec![linked_issue(
                        "PMPLAN-3",
                        vec![link("inwardIssue", "PROJ-7", "Story")],
                    )],
                ]),
            )
            .route(
                EPICS,
                paged(vec![vec![
                    epic_child("PROJ-6", "PROJ-5"),
                    epic_child("PROJ-1", "PROJ-5"),
                ]]),
            )
    }

    #[test]
    fn loading_initiatives_twice_fetches_once() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        let first = repo.open_initiatives().expect("first load").to_vec();
        let second = repo.open_initiatives().expect("second load").to_vec();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(endpoint.searches_matching(INITIATIVES), 1);
        let snapshot = repo.runner().metrics().snapshot();
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[test]
    fn open_plans_loads_initiatives_first() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        let (initiatives, plans) = repo.open_plans().expect("plans");

        assert_eq!(initiatives.len(), 2);
        assert_eq!(plans.len(), 3);
        let order: Vec<_> = endpoint
            .searches()
            .into_iter()
            .filter(|call| call.token.is_none())
            .map(|call| call.jql)
            .collect();
        assert!(order[0].contains(INITIATIVES));
        assert!(order[1].contains(PLANS));
        assert!(order[2].starts_with(EPICS));
    }

    #[test]
    fn epics_expand_once_and_keep_the_epic_node() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        repo.open_plans().expect("plans");
        let keys: Vec<String> = repo
            .plan("PMPLAN-1")
            .expect("plan")
            .children
            .iter()
            .map(|child| child.key().to_string())
            .collect();
        assert_eq!(keys, vec!["PROJ-1", "PROJ-5", "PROJ-3", "PROJ-6"]);
        let epic_query = endpoint
            .searches()
            .into_iter()
            .find(|call| call.jql.starts_with(EPICS))
            .expect("epic batch issued");
        assert_eq!(epic_query.jql, "parent IN (PROJ-5) ORDER BY key");

        repo.reconcile().expect("second reconcile");
        repo.open_plans().expect("plans again");

        assert_eq!(repo.plan("PMPLAN-1").expect("plan").children.len(), 4);
        assert_eq!(endpoint.searches_matching(EPICS), 1);
        assert_eq!(endpoint.searches_matching(PLANS), 2);
    }

    #[test]
    fn plan_excludes_link_to_its_initiative() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);
        repo.open_plans().expect("plans");

        let plan = repo.plan("PMPLAN-1").expect("plan");
        assert!(plan.children.iter().all(|child| child.key() != "INIT-1"));
    }

    #[test]
    fn unlinked_plan_stays_in_flat_list() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        let (initiatives, plans) = repo.open_plans().expect("plans");

        assert!(plans.iter().any(|plan| plan.key == "PMPLAN-3"));
        assert!(initiatives
            .iter()
            .flat_map(Initiative::plans)
            .all(|plan| plan.key != "PMPLAN-3"));
    }

    #[test]
    fn initiatives_hold_expanded_plans() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        let (initiatives, _) = repo.open_plans().expect("plans");

        let linked: Vec<_> = initiatives[0].plans().map(|plan| plan.key.as_str()).collect();
        assert_eq!(linked, vec!["PMPLAN-1"]);
        assert!(initiatives[0].plans().all(|plan| plan.expanded));
    }

    #[test]
    fn find_ticket_returns_first_initiative() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);
        assert!(repo.find_ticket_by_key("PROJ-3").is_none());

        repo.open_plans().expect("plans");

        let (initiative, ticket) = repo.find_ticket_by_key("PROJ-3").expect("found");
        assert_eq!(initiative, "INIT-1");
        assert_eq!(ticket.key, "PROJ-3");
        let (initiative, _) = repo.find_ticket_by_key("PROJ-6").expect("grandchild");
        assert_eq!(initiative, "INIT-1");
        assert!(repo.find_ticket_by_key("PROJ-7").is_none());
    }

    #[test]
    fn shared_ticket_maps_to_first_parent() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);
        repo.open_plans().expect("plans");

        let by_plan = repo.leaf_ticket_to_plan_map();
        assert_eq!(by_plan.get("PROJ-3").map(String::as_str), Some("PMPLAN-1"));
        assert_eq!(by_plan.get("PROJ-7").map(String::as_str), Some("PMPLAN-3"));
        assert_eq!(by_plan.get("PROJ-6").map(String::as_str), Some("PMPLAN-1"));

        let by_initiative = repo.leaf_ticket_to_initiative_map();
        assert_eq!(
            by_initiative.get("PROJ-3").map(String::as_str),
            Some("INIT-1")
        );
        assert!(!by_initiative.contains_key("PROJ-7"));
    }

    #[test]
    fn lookups_are_rebuilt_after_reset() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);
        assert!(repo.leaf_ticket_to_plan_map().is_empty());

        repo.open_plans().expect("plans");
        assert!(!repo.leaf_ticket_to_plan_map().is_empty());

        repo.reset();
        assert!(repo.leaf_ticket_to_plan_map().is_empty());
        assert!(!repo.is_reconciled());

        repo.open_plans().expect("reload");
        assert_eq!(endpoint.searches_matching(INITIATIVES), 2);
        assert_eq!(endpoint.searches_matching(EPICS), 2);
    }

    #[test]
    fn missing_epic_children_expand_to_nothing() {
        let endpoint = single_plan(vec![link("inwardIssue", "PROJ-5", "Epic")]);
        let mut repo = repository(&endpoint);

        let (_, plans) = repo.open_plans().expect("plans");

        assert_eq!(plans[0].children.len(), 1);
        assert!(plans[0].expanded);
    }

    #[test]
    fn epic_keys_are_fetched_in_batches() {
        let endpoint = single_plan(vec![
            link("inwardIssue", "PROJ-8", "Epic"),
            link("inwardIssue", "PROJ-5", "Epic"),
            link("inwardIssue", "PROJ-6", "Epic"),
        ])
        .route(
            "parent IN (PROJ-5,PROJ-6)",
            paged(vec![vec![
                epic_child("PROJ-10", "PROJ-5"),
                epic_child("PROJ-11", "PROJ-6"),
            ]]),
        )
        .route(
            "parent IN (PROJ-8)",
            paged(vec![vec![epic_child("PROJ-12", "PROJ-8")]]),
        );
        let queries = HierarchyQueries {
            epic_batch_size: 2,
            ..HierarchyQueries::default()
        };
        let mut repo = repository_with(&endpoint, queries);

        repo.open_plans().expect("plans");

        let epic_queries: Vec<String> = endpoint
            .searches()
            .into_iter()
            .map(|call| call.jql)
            .filter(|jql| jql.starts_with(EPICS))
            .collect();
        assert_eq!(
            epic_queries,
            vec![
                "parent IN (PROJ-5,PROJ-6) ORDER BY key",
                "parent IN (PROJ-8) ORDER BY key",
            ]
        );
        let keys: Vec<String> = repo
            .plan("PMPLAN-1")
            .expect("plan")
            .children
            .iter()
            .map(|child| child.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec!["PROJ-8", "PROJ-5", "PROJ-6", "PROJ-12", "PROJ-10", "PROJ-11"]
        );
    }

    #[test]
    fn epic_with_invalid_key_is_never_queried() {
        let endpoint = single_plan(vec![
            link("inwardIssue", "bad key", "Epic"),
            link("inwardIssue", "PROJ-5", "Epic"),
        ])
        .route(EPICS, paged(vec![vec![epic_child("PROJ-10", "PROJ-5")]]));
        let mut repo = repository(&endpoint);

        repo.open_plans().expect("plans");

        assert!(endpoint.searches().iter().all(|call| !call.jql.contains("bad key")));
        assert_eq!(endpoint.searches_matching("parent IN (PROJ-5)"), 1);
        let keys: Vec<String> = repo
            .plan("PMPLAN-1")
            .expect("plan")
            .children
            .iter()
            .map(|child| child.key().to_string())
            .collect();
        assert_eq!(keys, vec!["bad key", "PROJ-5", "PROJ-10"]);
    }

    #[test]
    fn linked_plans_share_storage_with_flat_list() {
        let endpoint = hierarchy();
        let mut repo = repository(&endpoint);

        let (initiatives, plans) = repo.open_plans().expect("plans");

        let flat = plans
            .iter()
            .find(|plan| plan.key == "PMPLAN-1")
            .expect("flat plan");
        let linked = initiatives[0]
            .children
            .iter()
            .find_map(|child| match child {
                ChildIssue::Plan(plan) => Some(plan),
                _ => None,
            })
            .expect("linked plan");
        assert!(Arc::ptr_eq(flat, linked));
    }

    #[test]
    fn fetch_failure_propagates_and_keeps_prior_collections() {
        let endpoint = hierarchy().failing(EPICS);
        let mut repo = repository(&endpoint);

        let err = repo.open_plans().expect_err("epic batch fails");
        assert!(matches!(err, JiraError::Malformed(_)));
        assert!(!repo.is_reconciled());

        repo.open_initiatives().expect("still cached");
        assert_eq!(endpoint.searches_matching(INITIATIVES), 1);
    }

    #[test]
    fn unknown_plan_is_not_found() {
        let endpoint = hierarchy();
        let repo = repository(&endpoint);
        assert!(matches!(repo.plan("PMPLAN-1"), Err(JiraError::NotFound(_))));
    }

    #[test]
    fn issue_key_validation() {
        assert!(is_valid_issue_key("PROJ-12"));
        assert!(is_valid_issue_key("A1_B-3"));
        assert!(!is_valid_issue_key("proj-1"));
        assert!(!is_valid_issue_key("PROJ-1) OR (1=1"));
    }
}

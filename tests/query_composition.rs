//! Query composition through definitions, and the two field selection passes.

mod common;

use common::{RecordingDefinition, disk, disk_graph, field, identity, init_logging, service_with};
use proptest::prelude::*;
use resource_engine::query::{
    FieldSelection, FieldSelectionPhase, FilterExpression, IncludeElement, PaginationExpression,
    QueryComposer, QueryIntent, SortDirection, SortElement, SortExpression, SparseFieldSet,
};
use resource_engine::resource::{RelationshipValue, Resource, ResourceId};
use resource_engine::{
    DefinitionRegistry, EngineError, EngineOptions, RequestContext, ResourceDefinition,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const DISK_FIELDS: [&str; 4] = ["manufacturer", "serialCode", "internalFlag", "partitions"];

fn composer(registry: DefinitionRegistry) -> QueryComposer {
    QueryComposer::new(
        disk_graph(),
        Arc::new(registry),
        Arc::new(EngineOptions::default()),
    )
}

fn filter_strategy() -> impl Strategy<Value = FilterExpression> {
    let leaf = (
        prop::sample::select(vec!["manufacturer", "serialCode", "internalFlag"]),
        "[a-z]{1,8}",
    )
        .prop_map(|(field, value)| FilterExpression::equals(field, json!(value)));

    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(FilterExpression::and),
            prop::collection::vec(inner.clone(), 2..4).prop_map(FilterExpression::or),
            inner.prop_map(FilterExpression::not),
        ]
    })
}

fn sort_strategy() -> impl Strategy<Value = Option<SortExpression>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["id", "manufacturer", "serialCode"]),
            any::<bool>(),
        ),
        0..3,
    )
    .prop_map(|elements| {
        if elements.is_empty() {
            return None;
        }
        Some(SortExpression::new(
            elements
                .into_iter()
                .map(|(field, ascending)| SortElement {
                    field: field.to_string(),
                    direction: if ascending {
                        SortDirection::Ascending
                    } else {
                        SortDirection::Descending
                    },
                })
                .collect(),
        ))
    })
}

fn intent_strategy() -> impl Strategy<Value = QueryIntent> {
    (
        prop::option::of(filter_strategy()),
        sort_strategy(),
        prop::option::of((1usize..5, prop::option::of(1usize..50))),
        prop::option::of(prop::sample::subsequence(DISK_FIELDS.to_vec(), 1..=4)),
    )
        .prop_map(|(filter, sort, pagination, fields)| {
            let mut intent = QueryIntent::new();
            intent.filter = filter;
            intent.sort = sort;
            intent.pagination = pagination
                .and_then(|(number, size)| PaginationExpression::from_numbers(number, size));
            intent.sparse_field_set = fields.map(SparseFieldSet::new);
            intent
        })
}

struct Inert;

impl ResourceDefinition for Inert {}

proptest! {
    #[test]
    fn composing_without_definition_keeps_intent(intent in intent_strategy()) {
        let graph = disk_graph();
        let disks = graph.require("disks").unwrap();
        let layer = composer(DefinitionRegistry::new())
            .compose(disks, &intent, &RequestContext::new("identity"))
            .unwrap();

        prop_assert_eq!(&layer.filter, &intent.filter);
        prop_assert_eq!(&layer.sort, &intent.sort);
        prop_assert_eq!(&layer.selection, &intent.sparse_field_set);
        prop_assert_eq!(
            layer.pagination,
            Some(intent.pagination.unwrap_or_else(|| EngineOptions::default().default_pagination()))
        );
        prop_assert!(layer.includes.is_empty());
    }

    #[test]
    fn inert_definition_changes_nothing(intent in intent_strategy()) {
        let graph = disk_graph();
        let disks = graph.require("disks").unwrap();
        let context = RequestContext::new("no-op");

        let bare = composer(DefinitionRegistry::new())
            .compose(disks, &intent, &context)
            .unwrap();
        let inert = composer(DefinitionRegistry::new().with("disks", Arc::new(Inert)).unwrap())
            .compose(disks, &intent, &context)
            .unwrap();

        prop_assert_eq!(bare, inert);
    }
}

#[test]
fn test_filter_hook_replaces_rather_than_merges() {
    struct OnlyWd;

    impl ResourceDefinition for OnlyWd {
        fn on_apply_filter(&self, _existing: Option<FilterExpression>) -> Option<FilterExpression> {
            Some(FilterExpression::equals("manufacturer", json!("WD")))
        }
    }

    let graph = disk_graph();
    let intent =
        QueryIntent::new().with_filter(FilterExpression::equals("serialCode", json!("abc")));
    let layer = composer(DefinitionRegistry::new().with("disks", Arc::new(OnlyWd)).unwrap())
        .compose(graph.require("disks").unwrap(), &intent, &RequestContext::new("replace"))
        .unwrap();

    assert_eq!(
        layer.filter,
        Some(FilterExpression::equals("manufacturer", json!("WD")))
    );
}

#[test]
fn test_hook_output_outside_graph_is_configuration_fault() {
    struct SortsOnGhost;

    impl ResourceDefinition for SortsOnGhost {
        fn on_apply_sort(&self, _existing: Option<SortExpression>) -> Option<SortExpression> {
            Some(SortExpression::ascending("ghost"))
        }
    }

    let graph = disk_graph();
    let result = composer(
        DefinitionRegistry::new()
            .with("disks", Arc::new(SortsOnGhost))
            .unwrap(),
    )
    .compose(
        graph.require("disks").unwrap(),
        &QueryIntent::new(),
        &RequestContext::new("ghost"),
    );

    assert!(matches!(result, Err(EngineError::Configuration { .. })));
}

/// Fetches `internalFlag` for meta but never exposes it.
struct InternalFlagAsMeta;

impl ResourceDefinition for InternalFlagAsMeta {
    fn on_apply_sparse_field_set(
        &self,
        existing: Option<SparseFieldSet>,
        selection: &FieldSelection<'_>,
    ) -> Option<SparseFieldSet> {
        match selection.phase() {
            FieldSelectionPhase::Query => selection.including(existing, ["internalFlag"]),
            FieldSelectionPhase::Serialization => selection.excluding(existing, ["internalFlag"]),
        }
    }

    fn get_meta(&self, resource: &Resource) -> Option<Map<String, Value>> {
        let flag = resource.attribute("internalFlag")?.clone();
        let mut meta = Map::new();
        meta.insert("highlighted".to_string(), flag);
        Some(meta)
    }
}

#[tokio::test]
async fn test_field_fetched_for_meta_is_not_exposed() {
    init_logging();
    let service = service_with(
        DefinitionRegistry::new()
            .with("disks", Arc::new(InternalFlagAsMeta))
            .unwrap(),
    );
    let context = RequestContext::new("internal-flag");

    let created = service
        .create(
            "disks",
            disk("WD").with_attribute("internalFlag", json!(true)),
            &context,
        )
        .await
        .unwrap();
    let (id, _) = identity(&created);

    let intent = QueryIntent::new().with_fields(SparseFieldSet::new(["manufacturer"]));
    let document = service
        .get_by_id("disks", &id, &intent, &context)
        .await
        .unwrap();

    let resource = document.data.resources()[0];
    assert_eq!(resource.fields.keys().collect::<Vec<_>>(), vec!["manufacturer"]);
    assert_eq!(
        resource.meta.as_ref().and_then(|meta| meta.get("highlighted")),
        Some(&json!(true))
    );

    // Without a client selection everything viewable except the flag is exposed
    let document = service
        .get_by_id("disks", &id, &QueryIntent::new(), &context)
        .await
        .unwrap();
    assert!(field(&document, "serialCode").is_some());
    assert!(field(&document, "concurrencyToken").is_some());
    assert!(field(&document, "internalFlag").is_none());
}

#[derive(Default)]
struct FieldCounter {
    query: AtomicUsize,
    serialization: AtomicUsize,
}

impl FieldCounter {
    fn counts(&self) -> (usize, usize) {
        (
            self.query.load(Ordering::SeqCst),
            self.serialization.load(Ordering::SeqCst),
        )
    }
}

impl ResourceDefinition for FieldCounter {
    fn on_apply_sparse_field_set(
        &self,
        existing: Option<SparseFieldSet>,
        selection: &FieldSelection<'_>,
    ) -> Option<SparseFieldSet> {
        let counter = if selection.is_query() {
            &self.query
        } else {
            &self.serialization
        };
        counter.fetch_add(1, Ordering::SeqCst);
        existing
    }
}

#[tokio::test]
async fn test_field_hook_runs_once_per_phase_and_type() {
    init_logging();
    let disks = Arc::new(FieldCounter::default());
    let partitions = Arc::new(FieldCounter::default());
    let service = service_with(
        DefinitionRegistry::new()
            .with("disks", disks.clone())
            .and_then(|registry| registry.with("partitions", partitions.clone()))
            .unwrap(),
    );
    let context = RequestContext::new("field-passes");

    for manufacturer in ["WD", "Samsung", "Toshiba"] {
        let mut linked = Vec::new();
        for mount in ["/", "/home"] {
            let partition = Resource::new("partitions").with_attribute("mountPoint", json!(mount));
            let created = service.create("partitions", partition, &context).await.unwrap();
            linked.push(identity(&created).0);
        }
        let input = disk(manufacturer)
            .with_relationship("partitions", RelationshipValue::ToMany(linked));
        service.create("disks", input, &context).await.unwrap();
    }

    let (disk_query, disk_serialization) = disks.counts();
    let (partition_query, partition_serialization) = partitions.counts();

    let intent = QueryIntent::new().with_include(IncludeElement::new("partitions"));
    let document = service
        .get_collection("disks", &intent, &context)
        .await
        .unwrap();

    assert_eq!(document.data.resources().len(), 3);
    assert_eq!(document.included.len(), 6);
    assert_eq!(disks.counts(), (disk_query + 1, disk_serialization + 1));
    assert_eq!(
        partitions.counts(),
        (partition_query + 1, partition_serialization + 1)
    );
}

#[tokio::test]
async fn test_field_hook_runs_once_when_type_is_included_again() {
    init_logging();
    let disks = Arc::new(FieldCounter::default());
    let service = service_with(
        DefinitionRegistry::new()
            .with("disks", disks.clone())
            .unwrap(),
    );
    let context = RequestContext::new("field-passes-cycle");

    let created = service.create("disks", disk("WD"), &context).await.unwrap();
    let (disk_id, token) = identity(&created);
    let partition = Resource::new("partitions")
        .with_attribute("mountPoint", json!("/"))
        .with_relationship("owner", RelationshipValue::ToOne(Some(disk_id.clone())));
    let partition = service.create("partitions", partition, &context).await.unwrap();

    let mut link = Resource::new("disks").with_relationship(
        "partitions",
        RelationshipValue::ToMany(vec![identity(&partition).0]),
    );
    link.set_token(token);
    service.update("disks", &disk_id, link, &context).await.unwrap();

    let before = disks.counts();
    let intent = QueryIntent::new()
        .with_include(IncludeElement::from_path("partitions.owner").unwrap());
    let document = service
        .get_collection("disks", &intent, &context)
        .await
        .unwrap();

    assert_eq!(document.data.resources().len(), 1);
    assert!(
        document
            .included
            .iter()
            .any(|resource| resource.resource_type == "partitions")
    );
    assert_eq!(disks.counts(), (before.0 + 1, before.1 + 1));
}

#[tokio::test]
async fn test_custom_query_parameter_narrows_results() {
    init_logging();
    let service = service_with(
        DefinitionRegistry::new()
            .with("disks", Arc::new(RecordingDefinition::new()))
            .unwrap(),
    );
    let context = RequestContext::new("parameters");

    service
        .create("disks", disk("WD").with_attribute("internalFlag", json!(true)), &context)
        .await
        .unwrap();
    service.create("disks", disk("Samsung"), &context).await.unwrap();

    let highlighted = service
        .get_collection(
            "disks",
            &QueryIntent::new().with_parameter("isHighlighted", "true"),
            &context,
        )
        .await
        .unwrap();
    let resources = highlighted.data.resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].fields["manufacturer"], json!("WD"));

    let bad_value = service
        .get_collection(
            "disks",
            &QueryIntent::new().with_parameter("isHighlighted", "maybe"),
            &context,
        )
        .await;
    assert!(matches!(bad_value, Err(EngineError::Validation { .. })));

    let unknown = service
        .get_collection(
            "disks",
            &QueryIntent::new().with_parameter("isShiny", "true"),
            &context,
        )
        .await;
    assert!(matches!(unknown, Err(EngineError::Validation { .. })));
}

#[tokio::test]
async fn test_default_and_hook_pagination() {
    struct PairsOnly;

    impl ResourceDefinition for PairsOnly {
        fn on_apply_pagination(
            &self,
            _existing: Option<PaginationExpression>,
        ) -> Option<PaginationExpression> {
            PaginationExpression::from_numbers(1, Some(2))
        }
    }

    init_logging();
    let plain = service_with(DefinitionRegistry::new());
    let paired = service_with(
        DefinitionRegistry::new()
            .with("disks", Arc::new(PairsOnly))
            .unwrap(),
    );
    let context = RequestContext::new("pages");

    for index in 0..12 {
        let name = format!("maker-{:02}", index);
        plain.create("disks", disk(&name), &context).await.unwrap();
        paired.create("disks", disk(&name), &context).await.unwrap();
    }

    let page = plain
        .get_collection("disks", &QueryIntent::new(), &context)
        .await
        .unwrap();
    assert_eq!(page.data.resources().len(), 10);

    let second = plain
        .get_collection(
            "disks",
            &QueryIntent::new()
                .with_pagination(PaginationExpression::from_numbers(2, Some(10)).unwrap()),
            &context,
        )
        .await
        .unwrap();
    assert_eq!(second.data.resources().len(), 2);

    let pair = paired
        .get_collection("disks", &QueryIntent::new(), &context)
        .await
        .unwrap();
    assert_eq!(pair.data.resources().len(), 2);
}

#[tokio::test]
async fn test_sorted_collection() {
    init_logging();
    let service = service_with(DefinitionRegistry::new());
    let context = RequestContext::new("sorted");

    for manufacturer in ["Samsung", "Crucial", "WD"] {
        service.create("disks", disk(manufacturer), &context).await.unwrap();
    }

    let document = service
        .get_collection(
            "disks",
            &QueryIntent::new().with_sort(SortExpression::descending("manufacturer")),
            &context,
        )
        .await
        .unwrap();

    let names: Vec<_> = document
        .data
        .resources()
        .iter()
        .map(|resource| resource.fields["manufacturer"].clone())
        .collect();
    assert_eq!(names, vec![json!("WD"), json!("Samsung"), json!("Crucial")]);
}

#[tokio::test]
async fn test_missing_resource_is_not_found() {
    init_logging();
    let service = service_with(DefinitionRegistry::new());

    let result = service
        .get_by_id(
            "disks",
            &ResourceId::Integer(7),
            &QueryIntent::new(),
            &RequestContext::new("missing"),
        )
        .await;

    assert!(matches!(result, Err(EngineError::NotFound { .. })));
}

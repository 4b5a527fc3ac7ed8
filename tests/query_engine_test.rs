use quarry::query::{
    EnumerableFactory, EvalContext, Filter, FilterOperator, FilterValue, QueryEngine,
    QueryEngineOptions, ValueKind,
};

#[derive(Debug, Clone)]
struct SceneObject {
    id: String,
    name: String,
    type_tag: String,
    size: u32,
    position: (f64, f64),
    refs: Vec<String>,
}

impl SceneObject {
    fn new(id: &str, type_tag: &str, size: u32, refs: &[&str]) -> Self {
        SceneObject {
            id: id.to_string(),
            name: format!("{id} {type_tag}"),
            type_tag: type_tag.to_string(),
            size,
            position: (size as f64 / 10.0, 0.0),
            refs: refs.iter().map(|r| r.to_string()).collect(),
        }
    }
}

fn scene() -> Vec<SceneObject> {
    vec![
        SceneObject::new("crate", "prefab", 10, &[]),
        SceneObject::new("barrel", "prefab", 20, &["crate"]),
        SceneObject::new("level", "scene", 30, &["barrel", "wood"]),
        SceneObject::new("wood", "material", 5, &[]),
        SceneObject::new("lamp", "light", 25, &["wood"]),
    ]
}

fn engine() -> QueryEngine<SceneObject> {
    let mut engine = QueryEngine::new();
    engine
        .add_filter("size", |o: &SceneObject| o.size)
        .add_filter("x", |o: &SceneObject| o.position.0)
        .add_filter_with_ops(
            "t",
            &[FilterOperator::Contains, FilterOperator::Equal, FilterOperator::NotEqual],
            |o: &SceneObject| o.type_tag.clone(),
        )
        .add_nested_filter(
            "ref",
            |o: &SceneObject| o.refs.clone(),
            |o: &SceneObject| o.id.clone(),
        )
        .set_search_words(|o: &SceneObject| o.name.split_whitespace().map(str::to_string).collect());
    engine
}

fn ids(engine: &QueryEngine<SceneObject>, data: &[SceneObject], text: &str) -> Vec<String> {
    let query = engine.parse(text);
    assert!(query.is_valid(), "'{text}': {:?}", query.errors());
    query.apply(data).map(|o| o.id.clone()).collect()
}

#[test]
fn test_numeric_filter_keeps_declared_order() {
    let engine = engine();
    let data: Vec<SceneObject> = scene().into_iter().filter(|o| o.size % 10 == 0).collect();
    assert_eq!(ids(&engine, &data, "size>=20"), vec!["barrel", "level"]);
    assert_eq!(ids(&engine, &data, "x<=2"), vec!["crate", "barrel"]);
}

#[test]
fn test_nested_query_semi_join() {
    let engine = engine();
    let data = scene();
    assert_eq!(ids(&engine, &data, "ref=(t:prefab)"), vec!["barrel", "level"]);
    assert_eq!(ids(&engine, &data, "ref=(t=material) -t=scene"), vec!["lamp"]);
    assert_eq!(
        ids(&engine, &data, "ref=(t:material) or size<6"),
        vec!["level", "wood", "lamp"]
    );
}

#[test]
fn test_free_text_and_filters_combine() {
    let engine = engine();
    let data = scene();
    assert_eq!(ids(&engine, &data, "bar"), vec!["barrel"]);
    assert_eq!(ids(&engine, &data, "prefab size>15"), vec!["barrel"]);
    assert_eq!(ids(&engine, &data, "\"lamp\" or \"wood\""), vec!["wood", "lamp"]);
    assert_eq!(ids(&engine, &data, "").len(), data.len());
}

#[test]
fn test_diagnostics_point_into_the_query() {
    let engine = engine();
    let data = scene();

    let query = engine.parse("size>=20 mass<3");
    assert!(!query.is_valid());
    assert_eq!(query.errors().len(), 1);
    let error = &query.errors()[0];
    assert_eq!(error.message, "Unknown filter 'mass'");
    assert_eq!((error.position, error.length), (9, 6));
    assert_eq!(query.apply(&data).count(), 0);

    let query = engine.parse("t>prefab");
    assert_eq!(
        query.errors()[0].message,
        "Operator '>' is not supported by filter 't'"
    );

    let query = engine.parse("ref=(t:prefab");
    assert!(!query.is_valid());
    assert_eq!(
        query.errors()[0].message,
        "Missing closing parenthesis in nested query"
    );
}

#[test]
fn test_unknown_filters_as_text() {
    let mut engine = QueryEngine::with_options(QueryEngineOptions {
        validate_filters: false,
        ..Default::default()
    });
    engine.set_search_words(|o: &SceneObject| vec![o.id.clone(), format!("kind:{}", o.type_tag)]);
    let data = scene();
    let found: Vec<&str> = engine
        .filter("kind:pre", &data)
        .into_iter()
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(found, vec!["crate", "barrel"]);
}

#[test]
fn test_host_defined_value_kind() {
    const TAG: &str = "layer";
    let mut engine = engine();
    engine
        .add_filter_def(
            Filter::with_kind("layer", ValueKind::Custom(TAG), |o: &SceneObject| {
                FilterValue::custom(TAG, if o.size > 20 { "foreground" } else { "background" })
            })
            .with_parser(|text| match text {
                "fg" | "foreground" => Some(FilterValue::custom(TAG, "foreground")),
                "bg" | "background" => Some(FilterValue::custom(TAG, "background")),
                _ => None,
            }),
        )
        .add_handler(
            ValueKind::Custom(TAG),
            ValueKind::Custom(TAG),
            FilterOperator::Equal,
            |a, b, _| a == b,
        );

    let data = scene();
    assert_eq!(ids(&engine, &data, "layer=fg"), vec!["level", "lamp"]);
    let query = engine.parse("layer=middle");
    assert_eq!(query.errors()[0].message, "Invalid value 'middle' for filter 'layer'");
}

#[test]
fn test_enumeration_is_lazy() {
    let engine = engine();
    let data = scene();
    let query = engine.parse("size>1");
    let mut results = query.apply(&data);

    // Items are produced one at a time so a host can report progress between them
    assert_eq!(results.next().map(|o| o.id.as_str()), Some("crate"));
    assert_eq!(results.next().map(|o| o.id.as_str()), Some("barrel"));
    assert_eq!(results.count(), 3);
}

#[test]
fn test_factory_shares_context() {
    let data = scene();
    let context = std::rc::Rc::new(EvalContext::new(&data));
    let factory = EnumerableFactory::new(context.clone());
    assert_eq!(factory.context().data().len(), data.len());
}

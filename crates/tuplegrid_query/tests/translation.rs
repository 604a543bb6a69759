//! Translation of the same predicate trees into every backend form.

use serde_json::json;
use tuplegrid_model::{Tuple, Value};
use tuplegrid_query::{
    CypherPredicateFactory, DocumentPredicateFactory, EntityMapping, IcklePredicateFactory,
    MappingRegistry, MemoryPredicateFactory, Predicate, PredicateValue, QueryError,
    QueryParameters, QueryTranslator, QueryTree, SortOrder, TupleFilter,
};

fn mapping() -> MappingRegistry {
    MappingRegistry::new()
        .with(EntityMapping::new("IndexedEntity").property("name", "entityName"))
        .with(
            EntityMapping::new("EmployeeST")
                .table("PersonST")
                .discriminator("DTYPE", ["EMP"]),
        )
        .with(
            EntityMapping::new("CommunityMemberST")
                .table("PersonST")
                .discriminator("DTYPE", ["EMP", "CMM"]),
        )
}

fn indexed(filter: Predicate) -> QueryTree {
    QueryTree::from_entity("IndexedEntity").filter(filter)
}

fn cypher(tree: &QueryTree) -> String {
    QueryTranslator::new(&mapping())
        .translate(tree, &CypherPredicateFactory::new("e"))
        .unwrap()
        .query
}

fn ickle(tree: &QueryTree) -> String {
    QueryTranslator::new(&mapping())
        .translate(tree, &IcklePredicateFactory::default())
        .unwrap()
        .query
}

fn document(tree: &QueryTree) -> serde_json::Value {
    QueryTranslator::new(&mapping())
        .translate(tree, &DocumentPredicateFactory::new())
        .unwrap()
        .query
        .filter
}

fn not_bob_and_one() -> Predicate {
    !Predicate::and([
        Predicate::equal("name", "Bob"),
        Predicate::equal("position", 1i64),
    ])
}

fn bob_not_between() -> Predicate {
    Predicate::and([
        Predicate::equal("name", "Bob"),
        !Predicate::between("position", 1i64, 3i64),
    ])
}

#[test]
fn whole_entity_without_filter() {
    let tree = QueryTree::from_entity("IndexedEntity");
    assert_eq!(cypher(&tree), "MATCH (e:IndexedEntity) RETURN e");
    assert_eq!(ickle(&tree), "from HibernateOGMGenerated.IndexedEntity");
    assert_eq!(document(&tree), json!({}));
}

#[test]
fn simple_equality() {
    let tree = indexed(Predicate::equal("title", "same"));
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE e.title = \"same\" RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where title = 'same'"
    );
    assert_eq!(document(&tree), json!({"title": "same"}));
}

#[test]
fn id_and_renamed_columns() {
    let by_id = indexed(Predicate::equal("id", "1"));
    assert_eq!(document(&by_id), json!({"_id": "1"}));
    assert_eq!(
        cypher(&by_id),
        "MATCH (e:IndexedEntity) WHERE e.id = \"1\" RETURN e"
    );

    let by_name = indexed(Predicate::equal("name", "Bob"));
    assert_eq!(document(&by_name), json!({"entityName": "Bob"}));
    assert_eq!(
        ickle(&by_name),
        "from HibernateOGMGenerated.IndexedEntity where entityName = 'Bob'"
    );
}

#[test]
fn negated_comparison_is_inverted() {
    let ne = indexed(Predicate::not_equal("name", "Bob"));
    assert_eq!(document(&ne), json!({"entityName": {"$ne": "Bob"}}));
    assert_eq!(
        cypher(&ne),
        "MATCH (e:IndexedEntity) WHERE e.entityName <> \"Bob\" RETURN e"
    );

    let not_ne = indexed(!Predicate::not_equal("name", "Bob"));
    assert_eq!(document(&not_ne), json!({"entityName": "Bob"}));
    assert_eq!(
        ickle(&not_ne),
        "from HibernateOGMGenerated.IndexedEntity where entityName = 'Bob'"
    );
}

#[test]
fn conjunction_wraps_children() {
    let tree = indexed(Predicate::and([
        Predicate::equal("title", "same"),
        Predicate::equal("position", 1i64),
    ]));
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE (e.title = \"same\") AND (e.position = 1) RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where (title = 'same') and (position = 1)"
    );
    assert_eq!(
        document(&tree),
        json!({"$and": [{"title": "same"}, {"position": 1}]})
    );
}

#[test]
fn negated_conjunction_applies_de_morgan() {
    let tree = indexed(not_bob_and_one());
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE (e.entityName <> \"Bob\") OR (e.position <> 1) RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where (entityName <> 'Bob') or (position <> 1)"
    );
    assert_eq!(
        document(&tree),
        json!({"$or": [{"entityName": {"$ne": "Bob"}}, {"position": {"$ne": 1}}]})
    );
}

#[test]
fn negated_range() {
    let tree = indexed(bob_not_between());
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE (e.entityName = \"Bob\") AND (e.position < 1 OR e.position > 3) RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where (entityName = 'Bob') and (( position < 1 || position > 3 ))"
    );
    assert_eq!(
        document(&tree),
        json!({"$and": [
            {"entityName": "Bob"},
            {"$or": [{"position": {"$lt": 1}}, {"position": {"$gt": 3}}]}
        ]})
    );
}

#[test]
fn nested_disjunction() {
    let tree = indexed(Predicate::or([
        Predicate::equal("name", "same"),
        Predicate::and([Predicate::equal("id", "4"), Predicate::equal("name", "booh")]),
    ]));
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE (e.entityName = \"same\") OR ((e.id = \"4\") AND (e.entityName = \"booh\")) RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where (entityName = 'same') or ((id = '4') and (entityName = 'booh'))"
    );
}

#[test]
fn range_with_named_parameters() {
    let tree = indexed(Predicate::between(
        "position",
        PredicateValue::param("lower"),
        PredicateValue::param("upper"),
    ));
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) WHERE e.position >= {lower} AND e.position <= {upper} RETURN e"
    );
    assert_eq!(
        ickle(&tree),
        "from HibernateOGMGenerated.IndexedEntity where ( position >= :lower && position <= :upper )"
    );

    let mut params = QueryParameters::new();
    params.insert("lower".to_string(), Value::Integer(10));
    params.insert("upper".to_string(), Value::Integer(20));
    let filter = QueryTranslator::new(&mapping())
        .translate(&tree, &DocumentPredicateFactory::with_parameters(params))
        .unwrap()
        .query
        .filter;
    assert_eq!(
        filter,
        json!({"$and": [{"position": {"$gte": 10}}, {"position": {"$lte": 20}}]})
    );
}

#[test]
fn document_rejects_unbound_parameters() {
    let tree = indexed(Predicate::equal("position", PredicateValue::param("p")));
    let err = QueryTranslator::new(&mapping())
        .translate(&tree, &DocumentPredicateFactory::new())
        .unwrap_err();
    assert_eq!(err, QueryError::missing_parameter("p"));
}

#[test]
fn membership() {
    let values = ["foo", "bar", "same"];
    let positive = indexed(Predicate::in_list("title", values));
    assert_eq!(
        cypher(&positive),
        "MATCH (e:IndexedEntity) WHERE ANY( _x_ IN [\"foo\", \"bar\", \"same\"] WHERE e.title = _x_) RETURN e"
    );
    assert_eq!(
        ickle(&positive),
        "from HibernateOGMGenerated.IndexedEntity where title in ('foo', 'bar', 'same')"
    );
    assert_eq!(
        document(&positive),
        json!({"title": {"$in": ["foo", "bar", "same"]}})
    );

    let negative = indexed(!Predicate::in_list("title", values));
    assert_eq!(
        cypher(&negative),
        "MATCH (e:IndexedEntity) WHERE NOT EXISTS(e.title) OR  NONE( _x_ IN [\"foo\", \"bar\", \"same\"] WHERE e.title = _x_) RETURN e"
    );
    assert_eq!(
        ickle(&negative),
        "from HibernateOGMGenerated.IndexedEntity where not title in ('foo', 'bar', 'same')"
    );
    assert_eq!(
        document(&negative),
        json!({"title": {"$nin": ["foo", "bar", "same"]}})
    );
}

#[test]
fn like_patterns() {
    let positive = indexed(Predicate::like("title", "Ali_e%"));
    assert_eq!(
        cypher(&positive),
        r#"MATCH (e:IndexedEntity) WHERE e.title=~"^\\QAli\\E.\\Qe\\E.*$" RETURN e"#
    );
    assert_eq!(
        ickle(&positive),
        "from HibernateOGMGenerated.IndexedEntity where title LIKE 'Ali_e%'"
    );
    assert_eq!(
        document(&positive),
        json!({"title": {"$regex": "^\\QAli\\E.\\Qe\\E.*$", "$options": "s"}})
    );

    let negative = indexed(!Predicate::like("title", "Ali_e%"));
    assert_eq!(
        cypher(&negative),
        r#"MATCH (e:IndexedEntity) WHERE NOT EXISTS(e.title) OR NOT(e.title=~"^\\QAli\\E.\\Qe\\E.*$") RETURN e"#
    );
    assert_eq!(
        ickle(&negative),
        "from HibernateOGMGenerated.IndexedEntity where not title LIKE 'Ali_e%'"
    );
    assert_eq!(
        document(&negative),
        json!({"title": {"$not": {"$regex": "^\\QAli\\E.\\Qe\\E.*$", "$options": "s"}}})
    );
}

#[test]
fn null_checks() {
    let is_null = indexed(Predicate::is_null("title"));
    assert_eq!(
        cypher(&is_null),
        "MATCH (e:IndexedEntity) WHERE NOT EXISTS(e.title) RETURN e"
    );
    assert_eq!(
        ickle(&is_null),
        "from HibernateOGMGenerated.IndexedEntity where title is null"
    );
    assert_eq!(document(&is_null), json!({"title": {"$exists": false}}));

    let not_null = indexed(!Predicate::is_null("title"));
    assert_eq!(
        cypher(&not_null),
        "MATCH (e:IndexedEntity) WHERE EXISTS(e.title) RETURN e"
    );
    assert_eq!(
        ickle(&not_null),
        "from HibernateOGMGenerated.IndexedEntity where title is not null"
    );
    assert_eq!(document(&not_null), json!({"title": {"$exists": true}}));
}

#[test]
fn discriminator_restrictions() {
    let employees = QueryTree::from_entity("EmployeeST");
    assert_eq!(
        cypher(&employees),
        "MATCH (e:PersonST) WHERE e.DTYPE = \"EMP\" RETURN e"
    );
    assert_eq!(
        ickle(&employees),
        "from HibernateOGMGenerated.PersonST where DTYPE = 'EMP'"
    );
    assert_eq!(document(&employees), json!({"DTYPE": "EMP"}));

    let red_hat = employees.filter(Predicate::equal("employer", "Red Hat"));
    assert_eq!(
        cypher(&red_hat),
        "MATCH (e:PersonST) WHERE e.employer = \"Red Hat\" AND e.DTYPE = \"EMP\" RETURN e"
    );
    assert_eq!(
        document(&red_hat),
        json!({"$and": [{"employer": "Red Hat"}, {"DTYPE": "EMP"}]})
    );

    let members = QueryTree::from_entity("CommunityMemberST")
        .filter(Predicate::equal("project", "Hibernate OGM"));
    assert_eq!(
        cypher(&members),
        "MATCH (e:PersonST) WHERE e.project = \"Hibernate OGM\" AND e.DTYPE IN [\"EMP\", \"CMM\"] RETURN e"
    );
    assert_eq!(
        ickle(&members),
        "from HibernateOGMGenerated.PersonST where project = 'Hibernate OGM' and DTYPE in ('EMP', 'CMM')"
    );
}

#[test]
fn projections_and_ordering() {
    let tree = QueryTree::from_entity("IndexedEntity")
        .select(["id", "name", "position"])
        .order_by("position", SortOrder::Descending);
    assert_eq!(
        cypher(&tree),
        "MATCH (e:IndexedEntity) RETURN e.id, e.entityName, e.position ORDER BY e.position DESC"
    );
    assert_eq!(
        ickle(&tree),
        "select id, entityName, position from HibernateOGMGenerated.IndexedEntity order by position desc"
    );

    let query = QueryTranslator::new(&mapping())
        .translate(&tree, &DocumentPredicateFactory::new())
        .unwrap();
    assert_eq!(query.projections, vec!["id", "entityName", "position"]);
    assert_eq!(
        query.query.projection,
        Some(json!({"_id": 1, "entityName": 1, "position": 1}))
    );
    assert_eq!(query.query.sort, vec![("position".to_string(), -1)]);
}

#[test]
fn empty_junction_is_rejected() {
    let err = QueryTranslator::new(&mapping())
        .translate(&indexed(Predicate::and([])), &IcklePredicateFactory::default())
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidPredicate { .. }));
}

#[test]
fn memory_filter_agrees_with_negation_push_down() {
    let rows: Vec<Tuple> = [("Bob", 1i64), ("Bob", 2), ("Alice", 1), ("Alixe", 5)]
        .into_iter()
        .map(|(name, position)| {
            let mut t = Tuple::new();
            t.put("entityName", name);
            t.put("position", position);
            t.into_applied()
        })
        .collect();
    let params = QueryParameters::new();
    let run = |predicate: Predicate| -> Vec<i64> {
        let query = QueryTranslator::new(&mapping())
            .translate(&indexed(predicate), &MemoryPredicateFactory)
            .unwrap()
            .query;
        rows.iter()
            .filter(|t| query.filter.matches(t, &params).unwrap())
            .filter_map(|t| t.get("position").and_then(|v| v.as_integer()))
            .collect()
    };

    assert_eq!(run(not_bob_and_one()), vec![2, 1, 5]);
    assert_eq!(run(bob_not_between()), Vec::<i64>::new());
    assert_eq!(run(Predicate::like("name", "Ali_e%")), vec![1, 5]);
}

#[test]
fn negated_memory_leaves_skip_rows_without_the_column() {
    let mut unnamed = Tuple::new();
    unnamed.put("position", 7i64);
    let unnamed = unnamed.into_applied();
    let params = QueryParameters::new();
    let negations = [
        !Predicate::equal("name", "X"),
        !Predicate::in_list("name", ["X"]),
        !Predicate::like("name", "X"),
        !Predicate::between("name", "A", "M"),
    ];
    for predicate in negations {
        let query = QueryTranslator::new(&mapping())
            .translate(&indexed(predicate), &MemoryPredicateFactory)
            .unwrap()
            .query;
        assert!(!query.filter.matches(&unnamed, &params).unwrap(), "{:?}", query.filter);
    }
}

#[test]
fn memory_root_without_filter_accepts_all() {
    let query = QueryTranslator::new(&mapping())
        .translate(&QueryTree::from_entity("IndexedEntity"), &MemoryPredicateFactory)
        .unwrap()
        .query;
    assert_eq!(query.filter, TupleFilter::All);
    assert_eq!(query.table, "IndexedEntity");
}

//! End-to-end tests of the graph compiler against SQLite.
//!
//! Every test gets its own in-memory database with the schema from
//! `common::SCHEMA`.

mod common;

use assert_matches::assert_matches;
use graphsql::orm::EdgeLoader;
use graphsql::spec::{
    BatchCreateSpec, CreateSpec, DeleteSpec, EdgeQuerySpec, FieldSpec, FieldType, QuerySpec,
    RelationKind, Step, UpdateSpec, Value,
};
use graphsql::sql::{OnConflict, OrderTerm, Predicate};
use graphsql::{Config, Error, Graph};
use pretty_assertions::assert_eq;

use common::*;

async fn create_user(graph: &Graph, user: &str) -> Value {
    let mut spec = CreateSpec::new(users()).set(name(user));
    graph.create_node(&ctx(), &mut spec).await.unwrap()
}

async fn create_account(graph: &Graph, address: &str) -> Value {
    let mut spec = CreateSpec::new(accounts()).set(email(address));
    graph.create_node(&ctx(), &mut spec).await.unwrap()
}

// ============================================================================
// Create
// ============================================================================

mod create {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_read_back() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users())
            .set(name("a8m"))
            .set(FieldSpec::new("age", FieldType::Int, 30));
        let id = graph.create_node(&ctx(), &mut spec).await.unwrap();

        assert_eq!(id, Value::Int(1));
        assert_eq!(spec.node.id.value, id);
        assert_eq!(column(&graph, users(), &id, "name").await, Value::from("a8m"));
        assert_eq!(column(&graph, users(), &id, "age").await, Value::Int(30));
    }

    #[tokio::test]
    async fn test_generated_uuid_ids() {
        let graph = memory_graph().await;
        let mut spec =
            CreateSpec::new(docs()).set(FieldSpec::new("title", FieldType::String, "readme"));
        let id = graph.create_node(&ctx(), &mut spec).await.unwrap();
        assert_matches!(id, Value::Uuid(_));

        let mut query = QuerySpec::new(docs()).filter(Predicate::eq("id", id.clone()));
        assert_eq!(graph.only_id(&ctx(), &mut query).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_supplied_id() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users()).id(42).set(name("answer"));
        let id = graph.create_node(&ctx(), &mut spec).await.unwrap();
        assert_eq!(id, Value::Int(42));
    }

    #[tokio::test]
    async fn test_unknown_column_is_rejected() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users()).set(FieldSpec::new("nickname", FieldType::String, "x"));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_unique_violation_is_constraint_error() {
        let graph = memory_graph().await;
        create_account(&graph, "a@x.com").await;

        let mut spec = CreateSpec::new(accounts()).set(email("a@x.com"));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");
    }

    #[tokio::test]
    async fn test_upsert_returns_existing_id() {
        let graph = memory_graph().await;
        let id = create_account(&graph, "a@x.com").await;

        let mut spec = CreateSpec::new(accounts())
            .set(email("a@x.com"))
            .set(name("renamed"))
            .on_conflict(OnConflict::update_new_values().on(["email"]));
        let upserted = graph.create_node(&ctx(), &mut spec).await.unwrap();

        assert_eq!(upserted, id);
        assert_eq!(column(&graph, accounts(), &id, "name").await, Value::from("renamed"));
    }

    #[tokio::test]
    async fn test_pending_reference_outside_batch() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users()).set(name("a")).edge(parent().pending(0));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_creates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(format!("sqlite://{}", dir.path().join("graph.db").display()));
        config.max_connections = 4;
        let graph = file_graph(&config).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let graph = graph.clone();
            tasks.push(tokio::spawn(async move {
                let mut spec = CreateSpec::new(accounts()).set(email(&format!("user{i}@x.com")));
                graph.create_node(&ctx(), &mut spec).await
            }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().as_i64().unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);

        let mut count = QuerySpec::new(accounts());
        assert_eq!(graph.count_nodes(&ctx(), &mut count).await.unwrap(), 8);
    }
}

// ============================================================================
// Edges
// ============================================================================

mod edges {
    use super::*;
    use pretty_assertions::assert_eq;

    fn friends_of(id: &Value) -> QuerySpec<'static> {
        let step = Step::new(
            ("users", "id"),
            RelationKind::M2M,
            false,
            "friends",
            ["user_id", "friend_id"],
            ("users", "id"),
        )
        .from_value(id.clone());
        QuerySpec::from_step(users(), &step).order_by(OrderTerm::asc("id"))
    }

    #[tokio::test]
    async fn test_bidi_m2m_is_symmetric() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let b = create_user(&graph, "b").await;
        let mut spec = CreateSpec::new(users())
            .set(name("c"))
            .edge(friends().nodes([a.clone(), b.clone()]));
        let c = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let ids = graph.ids(&ctx(), &mut friends_of(&c)).await.unwrap();
        assert_eq!(ids, [a.clone(), b.clone()]);
        let ids = graph.ids(&ctx(), &mut friends_of(&a)).await.unwrap();
        assert_eq!(ids, [c.clone()]);

        // Removing one friendship removes both directions.
        let mut update = UpdateSpec::new(users())
            .id(a.clone())
            .remove_edge(friends().node(c.clone()))
            .unwrap();
        graph.update_node(&ctx(), &mut update).await.unwrap();
        assert!(graph.ids(&ctx(), &mut friends_of(&a)).await.unwrap().is_empty());
        assert_eq!(graph.ids(&ctx(), &mut friends_of(&c)).await.unwrap(), [b]);
    }

    #[tokio::test]
    async fn test_duplicate_m2m_rows_are_ignored() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let b = create_user(&graph, "b").await;
        for _ in 0..2 {
            let mut update = UpdateSpec::new(users()).id(a.clone()).add_edge(friends().node(b.clone()));
            graph.update_node(&ctx(), &mut update).await.unwrap();
        }
        assert_eq!(graph.ids(&ctx(), &mut friends_of(&a)).await.unwrap(), [b]);
    }

    #[tokio::test]
    async fn test_o2o_target_cannot_be_shared() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(cards()).set(FieldSpec::new("number", FieldType::String, "1234"));
        let card_id = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let mut spec = CreateSpec::new(users()).set(name("a")).edge(card().node(card_id.clone()));
        let a = graph.create_node(&ctx(), &mut spec).await.unwrap();
        assert_eq!(column(&graph, cards(), &card_id, "owner_id").await, a);

        let mut spec = CreateSpec::new(users()).set(name("b")).edge(card().node(card_id.clone()));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");

        // The failed create was rolled back.
        let mut count = QuerySpec::new(users());
        assert_eq!(graph.count_nodes(&ctx(), &mut count).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_o2o_replace_requires_clear() {
        let graph = memory_graph().await;
        let mut first = CreateSpec::new(cards()).set(FieldSpec::new("number", FieldType::String, "1"));
        let first = graph.create_node(&ctx(), &mut first).await.unwrap();
        let mut second = CreateSpec::new(cards()).set(FieldSpec::new("number", FieldType::String, "2"));
        let second = graph.create_node(&ctx(), &mut second).await.unwrap();

        let mut spec = CreateSpec::new(users()).set(name("a")).edge(card().node(first.clone()));
        let a = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let mut update = UpdateSpec::new(users()).id(a.clone()).add_edge(card().node(second.clone()));
        let err = graph.update_node(&ctx(), &mut update).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");

        let mut update = UpdateSpec::new(users())
            .id(a.clone())
            .clear_edge(card())
            .add_edge(card().node(second.clone()));
        graph.update_node(&ctx(), &mut update).await.unwrap();
        assert_eq!(column(&graph, cards(), &first, "owner_id").await, Value::Null);
        assert_eq!(column(&graph, cards(), &second, "owner_id").await, a);
    }

    #[tokio::test]
    async fn test_o2o_accepts_a_single_target() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users()).set(name("a")).edge(card().nodes([1, 2]));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_bidi_o2o_links_both_rows() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let mut spec = CreateSpec::new(users()).set(name("b")).edge(spouse().node(a.clone()));
        let b = graph.create_node(&ctx(), &mut spec).await.unwrap();

        assert_eq!(column(&graph, users(), &a, "spouse_id").await, b);
        assert_eq!(column(&graph, users(), &b, "spouse_id").await, a);

        let mut spec = CreateSpec::new(users()).set(name("c")).edge(spouse().node(a.clone()));
        let err = graph.create_node(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");
    }

    #[tokio::test]
    async fn test_clearing_edges_is_idempotent() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let mut spec = CreateSpec::new(users()).set(name("b")).edge(spouse().node(a.clone()));
        let b = graph.create_node(&ctx(), &mut spec).await.unwrap();

        for _ in 0..2 {
            let mut update = UpdateSpec::new(users()).id(b.clone()).clear_edge(spouse());
            graph.update_node(&ctx(), &mut update).await.unwrap();
        }
        assert_eq!(column(&graph, users(), &a, "spouse_id").await, Value::Null);
        assert_eq!(column(&graph, users(), &b, "spouse_id").await, Value::Null);
    }

    #[tokio::test]
    async fn test_query_edges() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let b = create_user(&graph, "b").await;
        let mut spec = CreateSpec::new(teams())
            .set(name("core"))
            .edge(team_users().nodes([a.clone(), b.clone()]).field(FieldSpec::new(
                "role",
                FieldType::String,
                "member",
            )));
        let team = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let mut pairs = Vec::new();
        {
            let mut query = EdgeQuerySpec::new(
                team_users(),
                Box::new(|from, to| {
                    pairs.push((from, to));
                    Ok(())
                }),
            );
            assert_eq!(graph.query_edges(&ctx(), &mut query).await.unwrap(), 2);
        }
        pairs.sort_by_key(|(_, to)| to.as_i64());
        assert_eq!(pairs, [(team.clone(), a), (team, b)]);

        let mut query = EdgeQuerySpec::new(parent(), Box::new(|_, _| Ok(())));
        let err = graph.query_edges(&ctx(), &mut query).await.unwrap_err();
        assert!(err.is_validation_error());
    }
}

// ============================================================================
// Batch create
// ============================================================================

mod batch {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_bulk_ids_in_input_order() {
        let graph = memory_graph().await;
        let mut spec = BatchCreateSpec::new(
            ["a", "b", "c"]
                .into_iter()
                .map(|n| CreateSpec::new(users()).set(name(n)))
                .collect(),
        );
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();
        assert_eq!(ids, [Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(column(&graph, users(), &ids[2], "name").await, Value::from("c"));
        assert_eq!(spec.nodes[1].node.id.value, Value::Int(2));
    }

    #[tokio::test]
    async fn test_dependencies_are_created_first() {
        let graph = memory_graph().await;
        // child -> parent -> grandparent, listed child first.
        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(users()).set(name("child")).edge(parent().pending(1)),
            CreateSpec::new(users()).set(name("parent")).edge(parent().pending(2)),
            CreateSpec::new(users()).set(name("grandparent")),
        ]);
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        assert_eq!(ids, [Value::Int(3), Value::Int(2), Value::Int(1)]);
        assert_eq!(column(&graph, users(), &ids[0], "parent_id").await, ids[1]);
        assert_eq!(column(&graph, users(), &ids[1], "parent_id").await, ids[2]);
        assert_eq!(column(&graph, users(), &ids[2], "parent_id").await, Value::Null);
    }

    #[tokio::test]
    async fn test_batch_m2m_edges() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(teams()).set(name("x")).edge(team_users().node(a.clone())),
            CreateSpec::new(teams()).set(name("y")).edge(team_users().node(a.clone())),
        ]);
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        let mut teams_of_a = Vec::new();
        {
            let mut query = EdgeQuerySpec::new(
                user_teams(),
                Box::new(|_, team| {
                    teams_of_a.push(team);
                    Ok(())
                }),
            )
            .filter(Predicate::eq("user_id", a.clone()));
            graph.query_edges(&ctx(), &mut query).await.unwrap();
        }
        teams_of_a.sort_by_key(Value::as_i64);
        assert_eq!(teams_of_a, ids);
    }

    #[tokio::test]
    async fn test_rows_of_another_table_are_rejected() {
        let graph = memory_graph().await;
        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(users()).set(name("a")),
            CreateSpec::new(teams()).set(name("x")),
        ]);
        let err = graph.batch_create(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let graph = memory_graph().await;
        let mut spec = BatchCreateSpec::default();
        assert!(graph.batch_create(&ctx(), &mut spec).await.unwrap().is_empty());
    }

    async fn create_token(graph: &Graph, body: &str) -> Value {
        let mut spec = CreateSpec::new(tokens()).set(FieldSpec::new("body", FieldType::String, body));
        graph.create_node(&ctx(), &mut spec).await.unwrap()
    }

    fn accounts_batch(addresses: &[&str]) -> BatchCreateSpec {
        BatchCreateSpec::new(
            addresses
                .iter()
                .map(|address| CreateSpec::new(accounts()).set(email(address)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_do_nothing_leaves_conflicting_rows_unset() {
        let graph = memory_graph().await;
        create_account(&graph, "a@x.com").await;
        let t1 = create_token(&graph, "t1").await;
        let t2 = create_token(&graph, "t2").await;

        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(accounts())
                .set(email("a@x.com"))
                .edge(account_tokens().node(t1.clone())),
            CreateSpec::new(accounts())
                .set(email("b@x.com"))
                .edge(account_tokens().node(t2.clone())),
        ])
        .on_conflict(OnConflict::do_nothing().on(["email"]));
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        assert_eq!(ids[0], Value::Null);
        assert_eq!(spec.nodes[0].node.id.value, Value::Null);
        assert_eq!(column(&graph, accounts(), &ids[1], "email").await, Value::from("b@x.com"));

        // Only the inserted account got its edges.
        assert_eq!(column(&graph, tokens(), &t1, "account_id").await, Value::Null);
        assert_eq!(column(&graph, tokens(), &t2, "account_id").await, ids[1]);
        let mut count = QuerySpec::new(accounts());
        assert_eq!(graph.count_nodes(&ctx(), &mut count).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_do_nothing_without_conflict_columns() {
        let graph = memory_graph().await;
        create_account(&graph, "a@x.com").await;

        let mut spec =
            accounts_batch(&["b@x.com", "a@x.com", "c@x.com"]).on_conflict(OnConflict::do_nothing());
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        assert_eq!(ids[1], Value::Null);
        assert_eq!(column(&graph, accounts(), &ids[0], "email").await, Value::from("b@x.com"));
        assert_eq!(column(&graph, accounts(), &ids[2], "email").await, Value::from("c@x.com"));
    }

    #[tokio::test]
    async fn test_ignore_reports_existing_rows() {
        let graph = memory_graph().await;
        let a = create_account(&graph, "a@x.com").await;

        let mut spec =
            accounts_batch(&["b@x.com", "a@x.com"]).on_conflict(OnConflict::ignore().on(["email"]));
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        assert_eq!(ids[1], a);
        assert_ne!(ids[0], a);
        assert_eq!(column(&graph, accounts(), &ids[0], "email").await, Value::from("b@x.com"));
    }

    #[tokio::test]
    async fn test_update_new_values_overwrites_existing_rows() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(accounts())
            .set(email("a@x.com"))
            .set(name("old"));
        let a = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(accounts()).set(email("a@x.com")).set(name("new")),
            CreateSpec::new(accounts()).set(email("c@x.com")).set(name("c")),
        ])
        .on_conflict(OnConflict::update_new_values().on(["email"]));
        let ids = graph.batch_create(&ctx(), &mut spec).await.unwrap();

        assert_eq!(ids[0], a);
        assert_eq!(column(&graph, accounts(), &a, "name").await, Value::from("new"));
        assert_eq!(column(&graph, accounts(), &ids[1], "email").await, Value::from("c@x.com"));
    }

    #[tokio::test]
    async fn test_o2o_target_claimed_twice_in_bulk() {
        let graph = memory_graph().await;
        let u = create_user(&graph, "u").await;

        let mut spec = BatchCreateSpec::new(
            ["1", "2"]
                .into_iter()
                .map(|number| {
                    CreateSpec::new(cards())
                        .set(FieldSpec::new("number", FieldType::String, number))
                        .edge(card().inverse().node(u.clone()))
                })
                .collect(),
        );
        let err = graph.batch_create(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");

        let mut count = QuerySpec::new(cards());
        assert_eq!(graph.count_nodes(&ctx(), &mut count).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_o2o_target_claimed_twice_in_chain() {
        let graph = memory_graph().await;
        let mut spec = BatchCreateSpec::new(vec![
            CreateSpec::new(users()).set(name("x")),
            CreateSpec::new(users()).set(name("a")).edge(spouse().pending(0)),
            CreateSpec::new(users()).set(name("b")).edge(spouse().pending(0)),
        ]);
        let err = graph.batch_create(&ctx(), &mut spec).await.unwrap_err();
        assert!(err.is_constraint_error(), "{err}");

        let mut count = QuerySpec::new(users());
        assert_eq!(graph.count_nodes(&ctx(), &mut count).await.unwrap(), 0);
    }
}

// ============================================================================
// Update and delete
// ============================================================================

mod mutate {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_update_missing_node() {
        let graph = memory_graph().await;
        let mut update = UpdateSpec::new(users()).id(99).set(name("ghost"));
        let err = graph.update_node(&ctx(), &mut update).await.unwrap_err();
        assert_matches!(err, Error::NotFound { ref label } if label == "user");
    }

    #[tokio::test]
    async fn test_update_predicate_can_exclude_node() {
        let graph = memory_graph().await;
        let id = create_user(&graph, "a").await;
        let mut update = UpdateSpec::new(users())
            .id(id)
            .set(name("b"))
            .filter(Predicate::eq("name", "z"));
        let err = graph.update_node(&ctx(), &mut update).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_increment_and_read_back() {
        let graph = memory_graph().await;
        let mut spec = CreateSpec::new(users())
            .set(name("a"))
            .set(FieldSpec::new("age", FieldType::Int, 30));
        let id = graph.create_node(&ctx(), &mut spec).await.unwrap();

        let mut row = None;
        {
            let mut update = UpdateSpec::new(users())
                .id(id.clone())
                .add(FieldSpec::new("age", FieldType::Int, 2))
                .clear("parent_id")
                .scan(
                    Box::new(|columns| {
                        Ok(columns
                            .iter()
                            .map(|c| if c == "name" { FieldType::String } else { FieldType::Int })
                            .collect())
                    }),
                    Box::new(|columns, values| {
                        row = Some((columns.to_vec(), values));
                        Ok(())
                    }),
                );
            graph.update_node(&ctx(), &mut update).await.unwrap();
        }

        let (columns, values) = row.unwrap();
        assert_eq!(columns, ["id", "name", "age", "parent_id", "spouse_id"]);
        assert_eq!(
            values,
            [id, Value::from("a"), Value::Int(32), Value::Null, Value::Null]
        );
    }

    #[tokio::test]
    async fn test_increment_null_column() {
        let graph = memory_graph().await;
        let id = create_user(&graph, "a").await;
        let mut update = UpdateSpec::new(users()).id(id.clone()).add(FieldSpec::new("age", FieldType::Int, 1));
        graph.update_node(&ctx(), &mut update).await.unwrap();
        assert_eq!(column(&graph, users(), &id, "age").await, Value::Int(1));
    }

    #[tokio::test]
    async fn test_update_nodes_by_predicate() {
        let graph = memory_graph().await;
        for n in ["a", "b", "c"] {
            create_user(&graph, n).await;
        }
        let mut update = UpdateSpec::new(users())
            .set(FieldSpec::new("age", FieldType::Int, 7))
            .filter(Predicate::ne("name", "b"));
        assert_eq!(graph.update_nodes(&ctx(), &mut update).await.unwrap(), 2);

        let mut query = QuerySpec::new(users()).filter(Predicate::eq("age", 7));
        assert_eq!(graph.count_nodes(&ctx(), &mut query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_nodes_moves_m2m_edges() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        let b = create_user(&graph, "b").await;
        let mut team = CreateSpec::new(teams()).set(name("x"));
        let team = graph.create_node(&ctx(), &mut team).await.unwrap();

        let mut update = UpdateSpec::new(users())
            .add_edge(user_teams().node(team.clone()))
            .filter(Predicate::is_in("id", [a.clone(), b.clone()]));
        assert_eq!(graph.update_nodes(&ctx(), &mut update).await.unwrap(), 2);

        let mut members = 0;
        {
            let mut query = EdgeQuerySpec::new(
                team_users(),
                Box::new(|_, _| {
                    members += 1;
                    Ok(())
                }),
            );
            graph.query_edges(&ctx(), &mut query).await.unwrap();
        }
        assert_eq!(members, 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let graph = memory_graph().await;
        let a = create_user(&graph, "a").await;
        create_user(&graph, "b").await;
        create_user(&graph, "c").await;

        graph
            .delete_node(&ctx(), &DeleteSpec::new(users()).id(a.clone()))
            .await
            .unwrap();
        let err = graph
            .delete_node(&ctx(), &DeleteSpec::new(users()).id(a))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let deleted = graph
            .delete_nodes(&ctx(), &DeleteSpec::new(users()).filter(Predicate::ne("name", "zzz")))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn test_delete_referenced_node_is_constraint_error() {
        let graph = memory_graph().await;
        let account = create_account(&graph, "a@x.com").await;
        let mut spec = CreateSpec::new(tokens())
            .set(FieldSpec::new("body", FieldType::String, "t1"))
            .edge(token_owner().node(account.clone()));
        graph.create_node(&ctx(), &mut spec).await.unwrap();

        let err = graph
            .delete_node(&ctx(), &DeleteSpec::new(accounts()).id(account.clone()))
            .await
            .unwrap_err();
        assert!(err.is_constraint_error(), "{err}");
        assert_eq!(column(&graph, accounts(), &account, "email").await, Value::from("a@x.com"));
    }
}

// ============================================================================
// Queries
// ============================================================================

mod query {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seed(graph: &Graph) -> Vec<Value> {
        let mut spec = BatchCreateSpec::new(
            ["a", "b", "c"]
                .into_iter()
                .map(|n| CreateSpec::new(users()).set(name(n)))
                .collect(),
        );
        graph.batch_create(&ctx(), &mut spec).await.unwrap()
    }

    #[tokio::test]
    async fn test_offset_without_limit() {
        let graph = memory_graph().await;
        let ids = seed(&graph).await;
        let spec = QuerySpec::new(users()).select(["id"]).order_by(OrderTerm::asc("id")).offset(1);
        let rows = select(&graph, spec).await;
        assert_eq!(rows, [vec![ids[1].clone()], vec![ids[2].clone()]]);
    }

    #[tokio::test]
    async fn test_count_and_exist() {
        let graph = memory_graph().await;
        seed(&graph).await;

        let mut all = QuerySpec::new(users());
        assert_eq!(graph.count_nodes(&ctx(), &mut all).await.unwrap(), 3);
        let mut window = QuerySpec::new(users()).order_by(OrderTerm::asc("id")).limit(5).offset(2);
        assert_eq!(graph.count_nodes(&ctx(), &mut window).await.unwrap(), 1);

        let mut some = QuerySpec::new(users()).filter(Predicate::eq("name", "b"));
        assert!(graph.exist(&ctx(), &mut some).await.unwrap());
        let mut none = QuerySpec::new(users()).filter(Predicate::eq("name", "z"));
        assert!(!graph.exist(&ctx(), &mut none).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_row_helpers() {
        let graph = memory_graph().await;
        let ids = seed(&graph).await;

        let mut by_name = QuerySpec::new(users()).filter(Predicate::eq("name", "b"));
        assert_eq!(graph.only_id(&ctx(), &mut by_name).await.unwrap(), ids[1]);

        let mut all = QuerySpec::new(users()).order_by(OrderTerm::desc("id"));
        assert_eq!(graph.first_id(&ctx(), &mut all).await.unwrap(), ids[2]);
        assert!(graph.only_id(&ctx(), &mut all).await.unwrap_err().is_not_singular());
        assert!(graph.only(&ctx(), &mut all).await.unwrap_err().is_not_singular());

        let mut none = QuerySpec::new(users()).filter(Predicate::eq("name", "z"));
        assert!(graph.first(&ctx(), &mut none).await.unwrap_err().is_not_found());
        assert!(graph.first_id(&ctx(), &mut none).await.unwrap_err().is_not_found());
        assert!(graph.only(&ctx(), &mut none).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tokens_are_loaded_per_account() {
        let graph = memory_graph().await;
        let a8m = create_account(&graph, "a8m@x.com").await;
        let nati = create_account(&graph, "nati@x.com").await;
        create_account(&graph, "lonely@x.com").await;

        let tokens = [("t1", &a8m), ("t2", &nati), ("t3", &a8m)];
        let mut spec = BatchCreateSpec::new(
            tokens
                .iter()
                .map(|(body, owner)| {
                    CreateSpec::new(common::tokens())
                        .set(FieldSpec::new("body", FieldType::String, *body))
                        .edge(token_owner().node((*owner).clone()))
                })
                .collect(),
        );
        graph.batch_create(&ctx(), &mut spec).await.unwrap();

        let accounts = graph
            .query::<Account>()
            .order_by(OrderTerm::asc("id"))
            .with_edge(
                EdgeLoader::new(account_tokens(), |account: &mut Account, token: Token| {
                    account.tokens.push(token)
                })
                .order_by(OrderTerm::asc("id")),
            )
            .all(&ctx())
            .await
            .unwrap();

        let bodies: Vec<Vec<&str>> = accounts
            .iter()
            .map(|a| a.tokens.iter().map(|t| t.body.as_str()).collect())
            .collect();
        assert_eq!(bodies, [vec!["t1", "t3"], vec!["t2"], vec![]]);
        assert_eq!(accounts[0].email, "a8m@x.com");
    }

    #[tokio::test]
    async fn test_owner_is_loaded_per_token() {
        let graph = memory_graph().await;
        let owner = create_account(&graph, "a8m@x.com").await;
        for body in ["t1", "t2"] {
            let mut spec = CreateSpec::new(tokens())
                .set(FieldSpec::new("body", FieldType::String, body))
                .edge(token_owner().node(owner.clone()));
            graph.create_node(&ctx(), &mut spec).await.unwrap();
        }

        let tokens = graph
            .query::<Token>()
            .select(["id", "body"])
            .with_edge(EdgeLoader::new(token_owner(), |token: &mut Token, account: Account| {
                token.owner = Some(Box::new(account))
            }))
            .all(&ctx())
            .await
            .unwrap();

        assert_eq!(tokens.len(), 2);
        for token in &tokens {
            assert_eq!(token.owner.as_ref().map(|a| a.email.as_str()), Some("a8m@x.com"));
        }
    }

    #[tokio::test]
    async fn test_m2m_edge_load() {
        let graph = memory_graph().await;
        let ids = seed(&graph).await;
        for (team, members) in [("x", &ids[..2]), ("y", &ids[1..])] {
            let mut spec = CreateSpec::new(teams())
                .set(name(team))
                .edge(team_users().nodes(members.iter().cloned()));
            graph.create_node(&ctx(), &mut spec).await.unwrap();
        }

        let users = graph
            .query::<User>()
            .order_by(OrderTerm::asc("id"))
            .with_edge(
                EdgeLoader::new(user_teams(), |user: &mut User, team: Team| user.teams.push(team))
                    .order_by(OrderTerm::asc("id")),
            )
            .all(&ctx())
            .await
            .unwrap();

        let teams: Vec<Vec<&str>> = users
            .iter()
            .map(|u| u.teams.iter().map(|t| t.name.as_str()).collect())
            .collect();
        assert_eq!(teams, [vec!["x"], vec!["x", "y"], vec!["y"]]);
    }

    #[tokio::test]
    async fn test_typed_terminals() {
        let graph = memory_graph().await;
        seed(&graph).await;

        let first = graph
            .query::<User>()
            .order_by(OrderTerm::desc("id"))
            .first(&ctx())
            .await
            .unwrap();
        assert_eq!(first.name, "c");
        assert_eq!(graph.query::<User>().count(&ctx()).await.unwrap(), 3);
        assert!(
            graph
                .query::<User>()
                .filter(Predicate::eq("name", "z"))
                .only(&ctx())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(graph.query::<User>().exist(&ctx()).await.unwrap());
    }
}

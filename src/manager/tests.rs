use super::*;
use crate::error::{Error, ErrorKind};
use crate::rules::{ActionType, BooleanOperator, ConditionRule, ScriptRule, TrafficUnit};
use serde_json::json;
use std::fs;
use tempfile::{NamedTempFile, TempDir};

struct TestManager {
    _db_file: NamedTempFile,
    _defaults: TempDir,
    manager: Arc<RuleManager>,
}

async fn setup_with_defaults(files: &[(&str, &str)], bootstrap_on_create: bool) -> TestManager {
    let db_file = NamedTempFile::new().unwrap();
    let defaults = TempDir::new().unwrap();
    for (name, body) in files {
        fs::write(defaults.path().join(name), body).unwrap();
    }

    let manager = RuleManager::builder()
        .db_path(db_file.path())
        .default_rules_dir(defaults.path())
        .bootstrap_on_create(bootstrap_on_create)
        .build()
        .await
        .unwrap();

    TestManager {
        _db_file: db_file,
        _defaults: defaults,
        manager: Arc::new(manager),
    }
}

async fn setup() -> TestManager {
    setup_with_defaults(&[], true).await
}

fn new_service(name: &str, protocol: &str) -> NewService {
    NewService {
        name: name.to_string(),
        protocol: protocol.to_string(),
        port: Some(80),
        proxy_port: Some(10080),
    }
}

fn script_payload(names: &[(&str, i64)]) -> Vec<u8> {
    let rules: Vec<_> = names
        .iter()
        .map(|(name, order)| {
            json!({
                "name": name,
                "script": format!("return '{}' in data", name),
                "action_type": "block",
                "order": order,
                "protocol": "smtp"
            })
        })
        .collect();
    serde_json::to_vec(&rules).unwrap()
}

fn names(rules: &[ScriptRule]) -> Vec<&str> {
    rules.iter().map(|r| r.name.as_str()).collect()
}

#[tokio::test]
async fn test_replace_then_list_returns_ordered_set_with_stamped_protocol() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let count = t
        .manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("c", 2), ("a", 0), ("b", 1)]))
        .await
        .unwrap();
    assert_eq!(count, 3);

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    assert_eq!(names(&rules), vec!["a", "b", "c"]);
    for rule in &rules {
        assert_eq!(rule.protocol, "http");
        assert_eq!(rule.action_type, ActionType::Block);
        assert_eq!(rule.boolean_operator, BooleanOperator::And);
        assert!(rule.enabled);
    }
}

#[tokio::test]
async fn test_duplicate_orders_keep_payload_position() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    t.manager
        .replace_rules::<ScriptRule>(
            "web",
            &script_payload(&[("second", 1), ("first-a", 0), ("first-b", 0)]),
        )
        .await
        .unwrap();

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    assert_eq!(names(&rules), vec!["first-a", "first-b", "second"]);
}

#[tokio::test]
async fn test_replace_discards_previous_set() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    t.manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("old1", 0), ("old2", 1)]))
        .await
        .unwrap();
    t.manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("new", 0)]))
        .await
        .unwrap();

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    assert_eq!(names(&rules), vec!["new"]);
}

#[tokio::test]
async fn test_empty_payload_is_rejected_and_set_kept() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();
    t.manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("kept", 0)]))
        .await
        .unwrap();

    for body in [&b""[..], b"   ", b"[]"] {
        let err = t
            .manager
            .replace_rules::<ScriptRule>("web", body)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "body {:?}", body);
    }

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    assert_eq!(names(&rules), vec!["kept"]);
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let err = t
        .manager
        .replace_rules::<ScriptRule>("web", br#"{"not": "a list"}"#)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = t
        .manager
        .replace_rules::<ScriptRule>(
            "web",
            br#"[{"script": "x", "action_type": "explode", "order": 0}]"#,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_replace_unknown_service_is_not_found() {
    let t = setup().await;

    let err = t
        .manager
        .replace_rules::<ScriptRule>("ghost", &script_payload(&[("a", 0)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = t.manager.list_rules::<ScriptRule>("ghost").await.unwrap_err();
    assert!(matches!(err, Error::ServiceNotFound { ref name } if name == "ghost"));
}

#[tokio::test]
async fn test_condition_rules_are_validated_against_catalog() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let valid = json!([{
        "order": 0,
        "protocol": "ftp",
        "expression": {
            "type": "any",
            "exprs": [
                {"type": "predicate", "predicate": "method", "value": "POST"},
                {"type": "predicate", "predicate": "path_regex", "value": "^/admin"}
            ]
        }
    }]);
    let count = t
        .manager
        .replace_rules::<ConditionRule>("web", &serde_json::to_vec(&valid).unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let unknown = json!([{
        "order": 0,
        "expression": {"type": "predicate", "predicate": "ftp_command", "value": "USER"}
    }]);
    let err = t
        .manager
        .replace_rules::<ConditionRule>("web", &serde_json::to_vec(&unknown).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let rules = t.manager.list_rules::<ConditionRule>("web").await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].protocol, "http");
    assert_eq!(rules[0].action_type, ActionType::Block);
}

#[tokio::test]
async fn test_condition_rules_for_protocol_without_catalog_entry() {
    let t = setup().await;
    t.manager.create_service(new_service("game", "quic")).await.unwrap();

    let payload = json!([{
        "order": 0,
        "expression": {"type": "predicate", "predicate": "min_size", "value": 10}
    }]);
    let err = t
        .manager
        .replace_rules::<ConditionRule>("game", &serde_json::to_vec(&payload).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    assert!(t.manager.list_rules::<ConditionRule>("game").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_negative_size_from_yaml_catalog_is_rejected() {
    let yaml = r#"
tcp:
  big:
    kind: size_at_least
    domain:
      type: integer
      min: 0
"#;
    let catalog = crate::catalog::ConditionCatalog::from_yaml_str(yaml).unwrap();
    let db_file = NamedTempFile::new().unwrap();
    let manager = RuleManager::builder()
        .db_path(db_file.path())
        .catalog(Arc::new(catalog))
        .build()
        .await
        .unwrap();
    manager.create_service(new_service("raw", "tcp")).await.unwrap();

    let rule = |value: i64| {
        json!([{
            "order": 0,
            "action_type": "block",
            "expression": {"type": "predicate", "predicate": "big", "value": value}
        }])
    };

    let err = manager
        .replace_rules::<ConditionRule>("raw", &serde_json::to_vec(&rule(-1)).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    manager
        .replace_rules::<ConditionRule>("raw", &serde_json::to_vec(&rule(3)).unwrap())
        .await
        .unwrap();
    let snapshot = manager.snapshot("raw").await.unwrap();
    let unit = TrafficUnit::builder().payload("abcd").build();
    let mut never = |_: &ScriptRule, _: &TrafficUnit| -> crate::Result<bool> { Ok(false) };
    let decision = snapshot
        .evaluate(manager.catalog(), &unit, &mut never)
        .unwrap();
    assert_eq!(decision.verdict, ActionType::Block);
}

#[tokio::test]
async fn test_create_service_seeds_defaults() {
    let t = setup_with_defaults(
        &[
            ("http_allow_geo.py", "return geo_ok()"),
            ("http_block_badua.py", "return 'sqlmap' in ua"),
            ("ftp_block_x.py", "return True"),
        ],
        true,
    )
    .await;

    let created = t.manager.create_service(new_service("web", "http")).await.unwrap();
    assert_eq!(created.seeded, 2);

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    assert_eq!(rules.len(), 2);
    let mut orders: Vec<i64> = rules.iter().map(|r| r.order).collect();
    orders.sort();
    assert_eq!(orders, vec![0, 1]);
    assert!(rules.iter().all(|r| r.enabled && r.boolean_operator == BooleanOperator::And));
    let mut seeded = names(&rules);
    seeded.sort();
    assert_eq!(seeded, vec!["badua", "geo"]);
}

#[tokio::test]
async fn test_bootstrap_appends_after_existing_max_order() {
    let t = setup_with_defaults(
        &[("http_allow_geo.py", "a"), ("http_block_badua.py", "b")],
        false,
    )
    .await;

    let created = t.manager.create_service(new_service("web", "http")).await.unwrap();
    assert_eq!(created.seeded, 0);

    t.manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("mine", 4), ("other", 2)]))
        .await
        .unwrap();

    let seeded = t.manager.bootstrap_service("web").await.unwrap();
    assert_eq!(seeded, 2);

    let rules = t.manager.list_rules::<ScriptRule>("web").await.unwrap();
    let layout: Vec<(&str, i64)> = rules.iter().map(|r| (r.name.as_str(), r.order)).collect();
    assert_eq!(
        layout,
        vec![("other", 2), ("mine", 4), ("geo", 5), ("badua", 6)]
    );
}

#[tokio::test]
async fn test_bootstrap_with_unknown_action_writes_nothing() {
    let t = setup_with_defaults(
        &[("http_allow_geo.py", "a"), ("http_quarantine_x.py", "b")],
        false,
    )
    .await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let err = t.manager.bootstrap_service("web").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(t.manager.list_rules::<ScriptRule>("web").await.unwrap().is_empty());

    // creation with bootstrap enabled fails as a whole
    let t = setup_with_defaults(&[("http_quarantine_x.py", "b")], true).await;
    let err = t
        .manager
        .create_service(new_service("web", "http"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(
        t.manager.get_service("web").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_service_lifecycle() {
    let t = setup().await;

    t.manager.create_service(new_service("web", "http")).await.unwrap();
    t.manager.create_service(new_service("files", "ftp")).await.unwrap();

    let err = t
        .manager
        .create_service(new_service("web", "tcp"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let services = t.manager.list_services().await.unwrap();
    let listed: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(listed, vec!["files", "web"]);

    t.manager
        .replace_rules::<ScriptRule>("web", &script_payload(&[("a", 0)]))
        .await
        .unwrap();
    t.manager.delete_service("web").await.unwrap();

    assert_eq!(
        t.manager.list_rules::<ScriptRule>("web").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        t.manager.delete_service("web").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    // recreating the name starts from an empty set
    t.manager.create_service(new_service("web", "http")).await.unwrap();
    assert!(t.manager.list_rules::<ScriptRule>("web").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_service_definitions() {
    let t = setup().await;

    let mut bad_port = new_service("web", "http");
    bad_port.port = Some(70000);

    let invalid = [
        new_service("", "http"),
        new_service("web", " "),
        new_service("a/b", "http"),
        bad_port,
    ];
    for new in invalid {
        let err = t.manager.create_service(new).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}

#[tokio::test]
async fn test_condition_options_are_case_insensitive() {
    let t = setup().await;

    let upper = t.manager.condition_options("HTTP").unwrap();
    let lower = t.manager.condition_options("http").unwrap();
    assert_eq!(upper, lower);
    assert!(!upper.is_empty());

    let err = t.manager.condition_options("quic").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_snapshot_evaluation() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let conditions = json!([
        {
            "order": 0,
            "action_type": "log",
            "expression": {"type": "predicate", "predicate": "method", "value": "POST"}
        },
        {
            "order": 1,
            "action_type": "block",
            "expression": {"type": "predicate", "predicate": "path_regex", "value": "^/flag"}
        }
    ]);
    t.manager
        .replace_rules::<ConditionRule>("web", &serde_json::to_vec(&conditions).unwrap())
        .await
        .unwrap();

    let scripts = json!([
        {"name": "rewrite", "script": "x", "action_type": "modify", "order": 0}
    ]);
    t.manager
        .replace_rules::<ScriptRule>("web", &serde_json::to_vec(&scripts).unwrap())
        .await
        .unwrap();

    let snapshot = t.manager.snapshot("web").await.unwrap();
    assert_eq!(snapshot.conditions.len(), 2);
    assert_eq!(snapshot.scripts.len(), 1);

    let unit = TrafficUnit::builder()
        .command("POST")
        .target("/flag/1")
        .build();
    let mut always = |_: &ScriptRule, _: &TrafficUnit| -> crate::Result<bool> { Ok(true) };
    let decision = snapshot
        .evaluate(t.manager.catalog(), &unit, &mut always)
        .unwrap();
    assert_eq!(decision.verdict, ActionType::Block);
    assert_eq!(decision.conditions.logged, vec![0]);
    assert_eq!(decision.scripts.verdict, ActionType::Modify);

    let harmless = TrafficUnit::builder().command("GET").target("/").build();
    let mut never = |_: &ScriptRule, _: &TrafficUnit| -> crate::Result<bool> { Ok(false) };
    let decision = snapshot
        .evaluate(t.manager.catalog(), &harmless, &mut never)
        .unwrap();
    assert_eq!(decision.verdict, ActionType::Allow);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replace_and_read_never_mix_sets() {
    let t = setup().await;
    t.manager.create_service(new_service("web", "http")).await.unwrap();

    let set_a: Vec<(String, i64)> = (0..20).map(|i| (format!("a{}", i), i)).collect();
    let set_b: Vec<(String, i64)> = (0..20).map(|i| (format!("b{}", i), i)).collect();
    let payload = |set: &[(String, i64)]| {
        let refs: Vec<(&str, i64)> = set.iter().map(|(n, o)| (n.as_str(), *o)).collect();
        script_payload(&refs)
    };
    let payload_a = payload(&set_a);
    let payload_b = payload(&set_b);

    t.manager
        .replace_rules::<ScriptRule>("web", &payload_a)
        .await
        .unwrap();

    let mut writers = Vec::new();
    for i in 0..10 {
        let manager = Arc::clone(&t.manager);
        let body = if i % 2 == 0 { payload_b.clone() } else { payload_a.clone() };
        writers.push(tokio::spawn(async move {
            manager.replace_rules::<ScriptRule>("web", &body).await.unwrap();
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&t.manager);
        readers.push(tokio::spawn(async move {
            let rules = manager.list_rules::<ScriptRule>("web").await.unwrap();
            assert_eq!(rules.len(), 20);
            let prefix = &rules[0].name[..1];
            assert!(
                rules.iter().all(|r| r.name.starts_with(prefix)),
                "mixed rule set observed"
            );
        }));
    }

    for handle in writers.into_iter().chain(readers) {
        handle.await.unwrap();
    }
}

use std::sync::Arc;

use dyntools::Runtime;
use dyntools::cache::{ArtifactCache, MemoryBlobStore};
use dyntools::config::{CacheBackend, ConfigLoader, PolicyPreset, RuntimeConfig};
use dyntools::lifecycle::{
    LifecycleError, MemoryGateway, MemoryToolIndex, ParameterSchema, RegisterOptions,
    RegistrationError, ReturnSchema, ToolDefinition, ToolFilter, ToolIndex, ToolLifecycleManager,
    ToolSchema, ToolStatus,
};
use dyntools::policy::SecurityPolicy;
use dyntools::primitives::{AgentId, Language};
use dyntools::validation::ValidationService;

struct Fixture {
    manager: ToolLifecycleManager,
    index: Arc<MemoryToolIndex>,
    gateway: Arc<MemoryGateway>,
}

fn fixture(policy: SecurityPolicy) -> Fixture {
    let index = Arc::new(MemoryToolIndex::new());
    let gateway = Arc::new(MemoryGateway::new());
    let manager = ToolLifecycleManager::new(
        ValidationService::new(Arc::new(policy)),
        ArtifactCache::new(Arc::new(MemoryBlobStore::new())),
        index.clone(),
        gateway.clone(),
    );
    Fixture {
        manager,
        index,
        gateway,
    }
}

fn greeter(code: &str) -> ToolDefinition {
    ToolDefinition::new(
        "greeter",
        "Greets someone by name",
        "1.0.0",
        Language::Python,
        code,
        ToolSchema::new(ReturnSchema::new("string", "Greeting"))
            .with_parameter("name", ParameterSchema::new("string", "Who to greet").required()),
    )
}

const GREET: &str = "def greet(name):\n    return 'Hello, ' + name\n";

#[tokio::test]
async fn publish_failure_leaves_no_record() {
    let fx = fixture(SecurityPolicy::strict());
    fx.gateway.set_available(false);
    let owner = AgentId::random();

    let err = fx
        .manager
        .register(owner, &greeter(GREET), RegisterOptions::default())
        .await
        .into_result()
        .unwrap_err();
    let LifecycleError::Registration(RegistrationError::Publish { tool_id, .. }) = &err else {
        panic!("expected publish failure, got {err:?}");
    };

    assert!(fx.index.get(*tool_id).await.unwrap().is_none());
    assert!(fx.manager.find_by_agent(owner).await.unwrap().is_empty());
    assert!(fx.manager.tool_status(*tool_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn ownership_mismatch_leaves_record_unmodified() {
    let fx = fixture(SecurityPolicy::strict());
    let owner = AgentId::random();
    let intruder = AgentId::random();
    let record = fx
        .manager
        .register(owner, &greeter(GREET), RegisterOptions::default())
        .await
        .into_result()
        .unwrap();

    let mut hijack = greeter("def greet(name):\n    return 'pwned'\n");
    hijack.version = "6.6.6".into();
    let update = fx.manager.update(intruder, record.tool_id, &hijack).await;
    assert!(update.into_result().unwrap_err().is_not_owner());

    let deregister = fx.manager.deregister(intruder, record.tool_id, true).await;
    assert!(deregister.into_result().unwrap_err().is_not_owner());

    let deprecate = fx.manager.deprecate(intruder, record.tool_id).await;
    assert!(deprecate.into_result().unwrap_err().is_not_owner());

    let stored = fx.index.get(record.tool_id).await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert!(fx.gateway.published(record.tool_id).await.is_some());
}

#[tokio::test]
async fn shared_artifact_is_deleted_with_its_last_reference() {
    let fx = fixture(SecurityPolicy::strict());
    let agents = [AgentId::random(), AgentId::random(), AgentId::random()];
    let mut records = Vec::new();
    for agent in agents {
        records.push(
            fx.manager
                .register(agent, &greeter(GREET), RegisterOptions::default())
                .await
                .into_result()
                .unwrap(),
        );
    }
    let hash = records[0].content_hash();
    assert!(records.iter().all(|record| record.content_hash() == hash));
    assert_eq!(fx.index.find_by_content_hash(&hash).await.unwrap().len(), 3);

    let artifact = fx.manager.cache().retrieve(&hash).await.unwrap().unwrap();
    assert_eq!(artifact.usage_count, 2);

    for (position, (agent, record)) in agents.iter().zip(&records).enumerate() {
        let removed = fx
            .manager
            .deregister(*agent, record.tool_id, true)
            .await
            .into_result()
            .unwrap();
        let last = position == agents.len() - 1;
        assert_eq!(removed.artifact_deleted, last);
        assert_eq!(fx.manager.cache().exists(&hash).await.unwrap(), !last);
    }
}

#[tokio::test]
async fn revalidating_registration_keeps_shared_usage() {
    let fx = fixture(SecurityPolicy::strict());
    let mut hash = None;
    for _ in 0..3 {
        let record = fx
            .manager
            .register(AgentId::random(), &greeter(GREET), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        hash = Some(record.content_hash());
    }
    let hash = hash.unwrap();
    let before = fx.manager.cache().retrieve(&hash).await.unwrap().unwrap();
    assert_eq!(before.usage_count, 2);

    fx.manager
        .register(
            AgentId::random(),
            &greeter(GREET),
            RegisterOptions { skip_cache: true },
        )
        .await
        .into_result()
        .unwrap();
    let after = fx.manager.cache().retrieve(&hash).await.unwrap().unwrap();
    assert_eq!(after.usage_count, 2);
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn recursive_tools_register_only_under_permissive_policy() {
    let source = "def f(n): return f(n-1)";
    let owner = AgentId::random();

    let strict = fixture(SecurityPolicy::strict());
    let err = strict
        .manager
        .register(owner, &greeter(source), RegisterOptions::default())
        .await
        .into_result()
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(strict.index.is_empty().await);

    let permissive = fixture(SecurityPolicy::permissive());
    let record = permissive
        .manager
        .register(owner, &greeter(source), RegisterOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(record.status, ToolStatus::Active);
}

#[tokio::test]
async fn status_query_reflects_lifecycle() {
    let fx = fixture(SecurityPolicy::strict());
    let owner = AgentId::random();
    let record = fx
        .manager
        .register(owner, &greeter(GREET), RegisterOptions::default())
        .await
        .into_result()
        .unwrap();

    fx.manager.record_execution(record.tool_id).await.unwrap();
    fx.manager.record_execution(record.tool_id).await.unwrap();
    let status = fx.manager.tool_status(record.tool_id).await.unwrap();
    assert_eq!(status.status, ToolStatus::Active);
    assert_eq!(status.execution_count, 2);
    assert_eq!(status.version, "1.0.0");

    fx.manager
        .deprecate(owner, record.tool_id)
        .await
        .into_result()
        .unwrap();
    let deprecated = fx
        .manager
        .scan(&ToolFilter::new().with_status(ToolStatus::Deprecated))
        .await
        .unwrap();
    assert_eq!(deprecated.len(), 1);

    fx.manager
        .deregister(owner, record.tool_id, false)
        .await
        .into_result()
        .unwrap();
    let status = fx.manager.tool_status(record.tool_id).await.unwrap();
    assert_eq!(status.status, ToolStatus::Inactive);
}

#[tokio::test]
async fn runtime_assembles_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RuntimeConfig::default();
    config.policy.preset = PolicyPreset::Permissive;
    config.cache.backend = CacheBackend::Filesystem;
    config.cache.root = Some(dir.path().join("cache"));
    config.audit.path = Some(dir.path().join("audit.ndjson"));
    config.execution.timeout_seconds = 12;

    let runtime = Runtime::from_config(&config).await.unwrap();
    assert_eq!(runtime.policy().id(), SecurityPolicy::permissive().id());

    let record = runtime
        .lifecycle()
        .register(AgentId::random(), &greeter(GREET), RegisterOptions::default())
        .await
        .into_result()
        .unwrap();
    let artifact = runtime
        .lifecycle()
        .cache()
        .retrieve(&record.content_hash())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.execution.timeout_seconds, 12);
    assert!(dir.path().join("cache").exists());

    let key = runtime.validation().store_policy().await.into_result().unwrap();
    assert!(key.starts_with("policies/"));
    assert_eq!(runtime.audit().recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_configuration_is_reported() {
    let err = ConfigLoader::new()
        .load_with([("DYNTOOLS_CACHE_BACKEND", "filesystem")])
        .unwrap_err();
    assert!(err.to_string().contains("cache.root"));

    let mut config = RuntimeConfig::default();
    config.policy.path = Some("/nonexistent/policy.json".into());
    assert!(Runtime::from_config(&config).await.is_err());
}

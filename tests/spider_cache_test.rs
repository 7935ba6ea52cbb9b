//! Spider list cache against a real introspection subprocess.
#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crawld::config::RunnerConfig;
use crawld::core::{ArtifactStore, CoreError, CoreResult, SpiderIntrospector, SpiderListCache};
use crawld::infra::{FilesystemArtifactStore, ProcessIntrospector};
use futures::future::join_all;

/// Prints the artifact itself, which the tests fill with a JSON spider list.
const LISTER: &str = r#"
[ "$1" = list ] && [ "$3" = LOG_STDOUT=0 ] || exit 64
echo "loading project $CRAWLD_PROJECT $CRAWLD_VERSION"
cat "$CRAWLD_ARTIFACT"
echo
"#;

fn runner(script: &str) -> RunnerConfig {
    RunnerConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "lister".to_string()],
        ..RunnerConfig::default()
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<FilesystemArtifactStore>,
    introspector: ProcessIntrospector,
}

fn fixture(script: &str, timeout: Duration) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FilesystemArtifactStore::new(dir.path().join("eggs")));
    let introspector = ProcessIntrospector::new(
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        runner(script),
        dir.path().join("work"),
        timeout,
    );
    Fixture {
        _dir: dir,
        store,
        introspector,
    }
}

#[tokio::test]
async fn test_stale_until_invalidated() {
    let f = fixture(LISTER, Duration::from_secs(10));
    let cache = SpiderListCache::new();

    f.store.put("p", "r1", br#"["spider1","spider2"]"#).unwrap();
    let first = cache.get_or_populate("p", None, &f.introspector).await.unwrap();
    assert_eq!(first, vec!["spider1", "spider2"]);

    f.store
        .put("p", "r2", br#"["spider1","spider2","spider3"]"#)
        .unwrap();
    let stale = cache.get_or_populate("p", None, &f.introspector).await.unwrap();
    assert_eq!(stale, vec!["spider1", "spider2"]);

    assert!(cache.invalidate("p"));
    let fresh = cache.get_or_populate("p", None, &f.introspector).await.unwrap();
    assert_eq!(fresh, vec!["spider1", "spider2", "spider3"]);
}

#[tokio::test]
async fn test_invalidate_reintrospects_highest_version() {
    let f = fixture(LISTER, Duration::from_secs(10));
    let cache = SpiderListCache::new();

    f.store.put("p", "r1", br#"["a"]"#).unwrap();
    assert_eq!(cache.get_or_populate("p", None, &f.introspector).await.unwrap(), vec!["a"]);

    // "r1a" sorts after "r1" but before "r3".
    f.store.put("p", "r3", br#"["c"]"#).unwrap();
    f.store.put("p", "r1a", br#"["b"]"#).unwrap();
    cache.invalidate("p");
    assert_eq!(cache.get_or_populate("p", None, &f.introspector).await.unwrap(), vec!["c"]);

    f.store.delete_version("p", "r3").unwrap();
    cache.invalidate("p");
    assert_eq!(cache.get_or_populate("p", None, &f.introspector).await.unwrap(), vec!["b"]);
}

#[tokio::test]
async fn test_explicit_version_is_introspected() {
    let f = fixture(LISTER, Duration::from_secs(10));
    f.store.put("p", "r1", br#"["old"]"#).unwrap();
    f.store.put("p", "r2", br#"["new"]"#).unwrap();
    let spiders = f.introspector.list_spiders("p", Some("r1")).await.unwrap();
    assert_eq!(spiders, vec!["old"]);
}

#[tokio::test]
async fn test_failed_introspection_not_cached() {
    let f = fixture("echo 'Traceback' >&2; exit 1", Duration::from_secs(10));
    f.store.put("p", "r1", b"[]").unwrap();
    let cache = SpiderListCache::new();

    let err = cache
        .get_or_populate("p", None, &f.introspector)
        .await
        .unwrap_err();
    match err {
        CoreError::Introspection { stderr, .. } => assert!(stderr.contains("Traceback")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache.cached("p").is_none());
}

#[tokio::test]
async fn test_unparsable_output_is_error() {
    let f = fixture("echo spider1; echo spider2", Duration::from_secs(10));
    f.store.put("p", "r1", b"").unwrap();
    let err = f.introspector.list_spiders("p", None).await.unwrap_err();
    assert!(matches!(err, CoreError::Introspection { ref stdout, .. } if stdout.contains("spider2")));
}

#[tokio::test]
async fn test_timeout_kills_introspection() {
    let f = fixture("exec sleep 30", Duration::from_millis(200));
    f.store.put("p", "r1", b"[]").unwrap();
    let started = std::time::Instant::now();
    let err = f.introspector.list_spiders("p", None).await.unwrap_err();
    assert!(matches!(err, CoreError::Introspection { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let f = fixture(
        "echo 'loading settings'; echo 'slow import' >&2; exec sleep 30",
        Duration::from_millis(500),
    );
    f.store.put("p", "r1", b"[]").unwrap();
    match f.introspector.list_spiders("p", None).await.unwrap_err() {
        CoreError::Introspection {
            message,
            stdout,
            stderr,
        } => {
            assert!(message.contains("timed out"), "{message}");
            assert!(stdout.contains("loading settings"), "{stdout}");
            assert!(stderr.contains("slow import"), "{stderr}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_runner_is_introspection_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FilesystemArtifactStore::new(dir.path().join("eggs")));
    store.put("p", "r1", b"[]").unwrap();
    let introspector = ProcessIntrospector::new(
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        RunnerConfig {
            program: dir.path().join("no-such-runner").display().to_string(),
            ..RunnerConfig::default()
        },
        dir.path().join("work"),
        Duration::from_secs(5),
    );
    let err = introspector.list_spiders("p", None).await.unwrap_err();
    assert!(
        matches!(err, CoreError::Introspection { ref message, .. } if message.contains("no-such-runner")),
        "{err}"
    );
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let f = fixture(LISTER, Duration::from_secs(10));
    let err = f.introspector.list_spiders("ghost", None).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

struct SlowCounter {
    calls: AtomicUsize,
}

#[async_trait]
impl SpiderIntrospector for SlowCounter {
    async fn list_spiders(&self, _project: &str, _version: Option<&str>) -> CoreResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(vec!["s".to_string()])
    }
}

#[tokio::test]
async fn test_concurrent_misses_agree() {
    let cache = Arc::new(SpiderListCache::new());
    let lister = Arc::new(SlowCounter {
        calls: AtomicUsize::new(0),
    });
    let results = join_all((0..8).map(|_| {
        let cache = Arc::clone(&cache);
        let lister = Arc::clone(&lister);
        async move { cache.get_or_populate("p", None, lister.as_ref()).await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap(), vec!["s"]);
    }
    let calls = lister.calls.load(Ordering::SeqCst);
    assert!((1..=8).contains(&calls));
    assert_eq!(cache.cached("p"), Some(vec!["s".to_string()]));
}

//! A session wires URL normalization, loading, caching and video registration

use std::sync::Arc;
use std::time::Duration;

use media_preload_core::loaders::testing::{FakePlatform, PassthroughSanitizer};
use media_preload_core::loaders::{LoadedResource, MediaElement, FONT_FAMILY_KEY};
use media_preload_core::scheduler::{ContentKind, ErrorKind, PreloadableContent};
use media_preload_core::video::testing::{FakeProbe, FakeVideoPlatform};
use media_preload_core::video::Environment;
use media_preload_core::{BaseUrlResolver, PreloadConfig, PreloadSession, SessionCollaborators};
use regex::Regex;

const ORIGIN: &str = "https://invite.test";
const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
const INSTAGRAM: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Instagram 300.0";

struct Harness {
    session: PreloadSession,
    media: Arc<FakePlatform>,
    video: Arc<FakeVideoPlatform>,
}

fn harness(config: PreloadConfig, probe: FakeProbe) -> Harness {
    let media = Arc::new(FakePlatform::new());
    let video = Arc::new(FakeVideoPlatform::new(ORIGIN));
    let collaborators = SessionCollaborators {
        media: media.clone(),
        video: video.clone(),
        sanitizer: Arc::new(PassthroughSanitizer),
        resolver: Arc::new(BaseUrlResolver::new("https://invite.test/e/42/").unwrap()),
        probe: Arc::new(probe),
    };

    Harness {
        session: PreloadSession::new(config, collaborators),
        media,
        video,
    }
}

fn desktop() -> Harness {
    harness(
        PreloadConfig::default().with_trusted_origins(["https://cdn.test"]),
        FakeProbe::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_relative_urls_resolved_before_dispatch() {
    let h = desktop();
    let items = vec![PreloadableContent::new(
        "hero",
        ContentKind::Image,
        "media/hero.jpg",
    )];

    let results = h.session.run_stage("critical", items).await;

    assert!(results[0].success);
    assert_eq!(
        h.media.last_element().unwrap().source().as_deref(),
        Some("https://invite.test/e/42/media/hero.jpg")
    );
    assert!(h.session.resource("media/hero.jpg").is_some());
    assert!(h
        .session
        .resource("https://invite.test/e/42/media/hero.jpg")
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_loaded_videos_registered_under_origin_policy() {
    let h = desktop();
    let items = vec![
        PreloadableContent::new("own", ContentKind::Video, "/media/intro.mp4"),
        PreloadableContent::new("cdn", ContentKind::Video, "https://cdn.test/loop.mp4"),
        PreloadableContent::new("foreign", ContentKind::Video, "https://other.test/x.mp4"),
    ];

    let results = h.session.run_stage("critical", items).await;

    // Registration is refused, the load itself still succeeds
    assert!(results.iter().all(|r| r.success));
    assert_eq!(h.session.videos().live_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_blob_audio_is_tracked() {
    let h = desktop();
    let items = vec![PreloadableContent::new(
        "music",
        ContentKind::Audio,
        "blob:https://invite.test/7d1c",
    )];

    h.session.run_stage("secondary", items).await;

    assert_eq!(h.session.videos().tracked_blob_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_environment_detected_from_probe() {
    let h = harness(
        PreloadConfig::default(),
        FakeProbe::default().with_user_agent(IPHONE),
    );

    assert_eq!(h.session.environment(), Environment::Mobile);
    assert_eq!(h.session.videos().limits().max_videos, 5);
}

#[tokio::test(start_paused = true)]
async fn test_in_app_browser_caps_live_videos() {
    let h = harness(
        PreloadConfig::default(),
        FakeProbe::default().with_user_agent(INSTAGRAM),
    );
    let items = (0..5)
        .map(|i| PreloadableContent::new(format!("v{i}"), ContentKind::Video, format!("/v{i}.mp4")))
        .collect();

    let results = h.session.run_stage("critical", items).await;

    assert_eq!(results.len(), 5);
    assert_eq!(h.session.environment(), Environment::InAppBrowser);
    assert_eq!(h.session.videos().live_count(), 3);
}

fn videos(count: usize) -> Vec<PreloadableContent> {
    (0..count)
        .map(|i| PreloadableContent::new(format!("v{i}"), ContentKind::Video, format!("/v{i}.mp4")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_video_evicted_by_manager_is_reloaded() {
    let h = harness(
        PreloadConfig::default(),
        FakeProbe::default().with_user_agent(INSTAGRAM),
    );
    h.session.run_stage("critical", videos(5)).await;

    // Only handles the manager still holds come back from the cache
    let evicted: Vec<usize> = (0..5)
        .filter(|i| h.session.resource(&format!("/v{i}.mp4")).is_none())
        .collect();
    assert_eq!(evicted.len(), 5 - h.session.videos().live_count());
    let i = evicted[0];

    let rerun = vec![PreloadableContent::new(
        format!("v{i}"),
        ContentKind::Video,
        format!("/v{i}.mp4"),
    )];
    let results = h.session.run_stage("critical", rerun).await;

    assert!(results[0].success);
    assert!(!results[0].served_from_cache);
    match h.session.resource(&format!("/v{i}.mp4")) {
        Some(LoadedResource::Video(video)) => assert_eq!(
            video.element.source(),
            Some(format!("https://invite.test/v{i}.mp4"))
        ),
        other => panic!("expected a fresh video, got {other:?}"),
    }
    assert_eq!(h.media.elements().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_cache_clear_leaves_managed_videos_alone() {
    let h = desktop();
    h.session.run_stage("critical", videos(1)).await;

    h.session.scheduler().cache().clear();

    assert_eq!(h.session.videos().live_count(), 1);
    let element = h.media.last_element().unwrap();
    assert_eq!(element.source().as_deref(), Some("https://invite.test/v0.mp4"));
    assert_eq!(element.clear_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deduplicated_video_leaves_the_cache() {
    let h = desktop();
    let items = vec![
        PreloadableContent::new("a", ContentKind::Video, "/loop-1.mp4"),
        PreloadableContent::new("b", ContentKind::Video, "/loop-2.mp4"),
    ];
    h.session.run_stage("critical", items).await;

    let removed = h
        .session
        .videos()
        .deduplicate_videos(&Regex::new(r"loop-\d\.mp4").unwrap())
        .await;

    assert_eq!(removed, 1);
    let cached: Vec<LoadedResource> = ["/loop-1.mp4", "/loop-2.mp4"]
        .iter()
        .filter_map(|url| h.session.resource(url))
        .collect();
    assert_eq!(cached.len(), 1);
    assert!(cached[0].element().unwrap().source().is_some());
    assert_eq!(h.session.cache_stats().size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_detached_video_loads_but_stays_unmanaged() {
    let h = desktop();
    h.media.set_attach_elements(false);

    let results = h.session.run_stage("critical", videos(1)).await;

    assert!(results[0].success);
    assert_eq!(h.session.videos().live_count(), 0);
    assert!(!h.media.last_element().unwrap().is_connected());
    assert!(h.session.resource("/v0.mp4").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_repeat_stage_served_from_cache() {
    let h = desktop();
    let items = || {
        vec![
            PreloadableContent::new("hero", ContentKind::Image, "/hero.jpg"),
            PreloadableContent::new("script", ContentKind::Font, "https://fonts.test/script.woff2")
                .with_metadata(FONT_FAMILY_KEY, "Great Vibes"),
            PreloadableContent::new("bad", ContentKind::Font, "https://fonts.test/script.css"),
        ]
    };

    h.session.run_stage("critical", items()).await;
    h.session.run_stage("critical", items()).await;

    let stats = h.session.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(
        h.session.result("bad").unwrap().error_kind,
        Some(ErrorKind::InvalidUrl)
    );
    assert_eq!(h.media.font_requests(), 1);

    match h.session.resource("https://fonts.test/script.woff2") {
        Some(LoadedResource::Font(font)) => assert_eq!(font.family, "Great Vibes"),
        other => panic!("expected cached font, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_critical_ready_after_fallback() {
    let h = harness(
        PreloadConfig::default()
            .with_readiness_fallback(Duration::from_secs(2))
            .with_load_timeout(Duration::from_secs(30)),
        FakeProbe::default(),
    );
    // Never reports metadata
    h.media.script("https://invite.test/stuck.mp4", Vec::new());
    let items = vec![PreloadableContent::new("stuck", ContentKind::Video, "/stuck.mp4")];

    let watcher = async {
        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(!h.session.is_critical_ready("critical", Some("stuck")));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(h.session.is_critical_ready("critical", Some("stuck")));
        h.session.abort_stage("critical")
    };
    let (results, aborted) = tokio::join!(h.session.run_stage("critical", items), watcher);

    assert!(aborted);
    assert_eq!(results[0].error_kind, Some(ErrorKind::Aborted));
    assert_eq!(h.session.progress("critical").percentage, 100);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_releases_everything() {
    let h = desktop();
    let items = vec![
        PreloadableContent::new("a", ContentKind::Video, "/a.mp4"),
        PreloadableContent::new("b", ContentKind::Video, "/b.mp4"),
        PreloadableContent::new("f", ContentKind::Font, "https://fonts.test/f.woff2"),
    ];
    h.session.run_stage("critical", items).await;
    h.session.videos().track_blob("blob:https://invite.test/left-over");
    h.session.start_blob_sweeper(Duration::from_secs(30));

    let cleaned = h.session.teardown().await;

    assert_eq!(cleaned, 2);
    assert_eq!(h.session.videos().live_count(), 0);
    assert_eq!(h.session.cache_stats().size, 0);
    let faces = h.media.faces();
    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].release_count(), 1);
    assert_eq!(
        h.video.revoked(),
        vec!["blob:https://invite.test/left-over".to_string()]
    );
    for element in h.media.elements() {
        assert_eq!(element.source(), None);
        assert_eq!(element.listener_count(), 0);
    }
}

//! Every load outcome leaves its element without listeners

use std::sync::Arc;
use std::time::Duration;

use media_preload_loaders::testing::{FakePlatform, PassthroughSanitizer};
use media_preload_loaders::{FontConfig, LoaderSet, LoaderTimeouts, MediaElement, MediaEvent};
use media_preload_scheduler::{CancellationToken, ContentKind, MediaError, PreloadableContent};

fn loaders(platform: &Arc<FakePlatform>) -> LoaderSet {
    LoaderSet::new(
        platform.clone(),
        Arc::new(PassthroughSanitizer),
        LoaderTimeouts::uniform(Duration::from_secs(2)),
        FontConfig::default(),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn assert_no_listeners(platform: &FakePlatform) {
    for element in platform.elements() {
        assert_eq!(element.listener_count(), 0, "{:?}", element.source());
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_error_and_timeout_leave_no_listeners() {
    init_tracing();
    let platform = Arc::new(FakePlatform::new());
    platform.script(
        "https://cdn.test/broken.mp4",
        vec![(Duration::from_millis(5), MediaEvent::Error)],
    );
    platform.script("https://cdn.test/silent.jpg", Vec::new());
    platform.script("https://cdn.test/silent.mp3", Vec::new());
    let loaders = loaders(&platform);
    let token = CancellationToken::new();

    let items = [
        ("ok-image", ContentKind::Image, "https://cdn.test/ok.jpg", true),
        ("ok-video", ContentKind::Video, "https://cdn.test/ok.mp4", true),
        ("ok-audio", ContentKind::Audio, "https://cdn.test/ok.mp3", true),
        ("broken", ContentKind::Video, "https://cdn.test/broken.mp4", false),
        ("silent-image", ContentKind::Image, "https://cdn.test/silent.jpg", false),
        ("silent-audio", ContentKind::Audio, "https://cdn.test/silent.mp3", false),
    ];

    for (id, kind, url, succeeds) in items {
        let item = PreloadableContent::new(id, kind, url);
        let outcome = loaders.load_item(&item, &token).await;
        assert_eq!(outcome.is_ok(), succeeds, "{id}");
    }

    assert_eq!(platform.elements().len(), 6);
    assert_no_listeners(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_leaves_no_listeners() {
    init_tracing();
    let platform = Arc::new(FakePlatform::new());
    for url in ["https://cdn.test/a.jpg", "https://cdn.test/b.mp4", "https://cdn.test/c.mp3"] {
        platform.script(url, vec![(Duration::from_secs(1), MediaEvent::Load)]);
    }
    let loaders = loaders(&platform);
    let token = CancellationToken::new();

    let image = PreloadableContent::new("a", ContentKind::Image, "https://cdn.test/a.jpg");
    let video = PreloadableContent::new("b", ContentKind::Video, "https://cdn.test/b.mp4");
    let audio = PreloadableContent::new("c", ContentKind::Audio, "https://cdn.test/c.mp3");

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    };
    let (a, b, c, _) = tokio::join!(
        loaders.load_item(&image, &token),
        loaders.load_item(&video, &token),
        loaders.load_item(&audio, &token),
        cancel
    );

    for outcome in [a, b, c] {
        assert_eq!(outcome.unwrap_err(), MediaError::Aborted);
    }
    assert_no_listeners(&platform);
}

//! Scripted fakes of the native media platform
//!
//! Elements created by [`FakePlatform`] replay a per-URL script of events on
//! the tokio clock once their source is set, so tests can drive loaders under
//! `start_paused` time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use media_preload_scheduler::{MediaError, MediaResult};

use crate::platform::{
    ElementHandle, ElementKind, FontDisplay, FontHandle, ListenerCallback, ListenerId,
    MediaElement, MediaEvent, MediaPlatform, NativeFontFace, PreloadHint, ReadyState,
};
use crate::vector::MarkupSanitizer;

/// One scripted event: wait `delay` after the previous step, then emit
pub type Step = (Duration, MediaEvent);

type Scripts = Arc<Mutex<HashMap<String, Vec<Step>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Script played by elements whose URL has none registered
pub fn default_script(kind: ElementKind) -> Vec<Step> {
    let tick = Duration::from_millis(10);
    match kind {
        ElementKind::Image => vec![(tick, MediaEvent::Load)],
        ElementKind::Video => vec![
            (tick, MediaEvent::LoadedMetadata),
            (tick, MediaEvent::CanPlay),
        ],
        ElementKind::Audio => vec![(tick, MediaEvent::LoadedMetadata)],
    }
}

struct ElementState {
    listeners: Vec<(ListenerId, MediaEvent, ListenerCallback)>,
    next_listener: u64,
    removed_listeners: usize,
    source: Option<String>,
    preload_history: Vec<PreloadHint>,
    ready_state: ReadyState,
    natural_size: (u32, u32),
    paused: bool,
    connected: bool,
    visible: bool,
    error: Option<String>,
    clear_count: usize,
    pause_count: usize,
}

/// A fake media element
pub struct FakeElement {
    kind: ElementKind,
    this: Weak<FakeElement>,
    scripts: Option<Scripts>,
    state: Mutex<ElementState>,
}

impl FakeElement {
    /// A standalone, connected, paused element that plays no script
    pub fn new(kind: ElementKind) -> Arc<Self> {
        Self::build(kind, None)
    }

    fn build(kind: ElementKind, scripts: Option<Scripts>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            kind,
            this: this.clone(),
            scripts,
            state: Mutex::new(ElementState {
                listeners: Vec::new(),
                next_listener: 0,
                removed_listeners: 0,
                source: None,
                preload_history: Vec::new(),
                ready_state: ReadyState::HaveNothing,
                natural_size: (0, 0),
                paused: true,
                connected: true,
                visible: false,
                error: None,
                clear_count: 0,
                pause_count: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, ElementState> {
        lock(&self.state)
    }

    /// Fire `event`, updating element state the way a browser would
    pub fn emit(&self, event: MediaEvent) {
        let callbacks: Vec<ListenerCallback> = {
            let mut state = self.state();
            match event {
                MediaEvent::Load => state.natural_size = (640, 480),
                MediaEvent::LoadedMetadata => {
                    state.ready_state = state.ready_state.max(ReadyState::HaveMetadata)
                }
                MediaEvent::LoadedData => {
                    state.ready_state = state.ready_state.max(ReadyState::HaveCurrentData)
                }
                MediaEvent::CanPlay => {
                    state.ready_state = state.ready_state.max(ReadyState::HaveFutureData)
                }
                MediaEvent::CanPlayThrough => state.ready_state = ReadyState::HaveEnoughData,
                MediaEvent::Error => state.error = Some("scripted failure".to_string()),
                MediaEvent::Play => state.paused = false,
                MediaEvent::Pause | MediaEvent::Ended => state.paused = true,
            }
            state
                .listeners
                .iter()
                .filter(|(_, listened, _)| *listened == event)
                .map(|(_, _, callback)| callback.clone())
                .collect()
        };

        for callback in callbacks {
            callback(event);
        }
    }

    /// Start playback
    pub fn play(&self) {
        self.emit(MediaEvent::Play);
    }

    /// Number of listeners currently attached
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Number of successful `remove_listener` calls
    pub fn removed_listener_count(&self) -> usize {
        self.state().removed_listeners
    }

    /// Every preload hint set, in order
    pub fn preload_history(&self) -> Vec<PreloadHint> {
        self.state().preload_history.clone()
    }

    /// Number of `clear_source` calls
    pub fn clear_count(&self) -> usize {
        self.state().clear_count
    }

    /// Number of `pause` calls
    pub fn pause_count(&self) -> usize {
        self.state().pause_count
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    pub fn set_visible(&self, visible: bool) {
        self.state().visible = visible;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state().ready_state = ready_state;
    }

    /// Set the source without playing any script
    pub fn set_source_silently(&self, url: &str) {
        self.state().source = Some(url.to_string());
    }

    fn play_script(&self, url: &str) {
        let Some(scripts) = &self.scripts else {
            return;
        };
        let steps = lock(scripts)
            .get(url)
            .cloned()
            .unwrap_or_else(|| default_script(self.kind));
        let this = self.this.clone();

        tokio::spawn(async move {
            for (delay, event) in steps {
                tokio::time::sleep(delay).await;
                match this.upgrade() {
                    Some(element) => element.emit(event),
                    None => return,
                }
            }
        });
    }
}

impl MediaElement for FakeElement {
    fn kind(&self) -> ElementKind {
        self.kind
    }

    fn add_listener(&self, event: MediaEvent, callback: ListenerCallback) -> ListenerId {
        let mut state = self.state();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push((id, event, callback));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|(listener, _, _)| *listener != id);
        let removed = state.listeners.len() < before;
        if removed {
            state.removed_listeners += 1;
        }
        removed
    }

    fn set_preload(&self, hint: PreloadHint) {
        self.state().preload_history.push(hint);
    }

    fn set_source(&self, url: &str) {
        self.state().source = Some(url.to_string());
        self.play_script(url);
    }

    fn source(&self) -> Option<String> {
        self.state().source.clone()
    }

    fn clear_source(&self) {
        let mut state = self.state();
        state.source = None;
        state.ready_state = ReadyState::HaveNothing;
        state.clear_count += 1;
    }

    fn natural_size(&self) -> (u32, u32) {
        self.state().natural_size
    }

    fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn pause(&self) {
        self.state().pause_count += 1;
        self.emit(MediaEvent::Pause);
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn is_visible(&self) -> bool {
        self.state().visible
    }

    fn detach(&self) {
        self.state().connected = false;
    }

    fn error_message(&self) -> Option<String> {
        self.state().error.clone()
    }
}

/// Scripted outcome of one font-face registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStep {
    Succeed(Duration),
    Fail(Duration),
    /// Never settles
    Hang,
}

/// A fake registered font face
pub struct FakeFontFace {
    family: String,
    releases: AtomicUsize,
}

impl FakeFontFace {
    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }

    /// Number of `release` calls
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl NativeFontFace for FakeFontFace {
    fn family(&self) -> &str {
        &self.family
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        FakeFontFace::is_released(self)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(current: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scripted media platform
pub struct FakePlatform {
    scripts: Scripts,
    elements: Mutex<Vec<Arc<FakeElement>>>,
    texts: Mutex<HashMap<String, (Duration, MediaResult<String>)>>,
    fetch_requests: AtomicUsize,
    render_probe_result: AtomicBool,
    font_steps: Mutex<HashMap<String, VecDeque<FontStep>>>,
    font_requests: AtomicUsize,
    fonts_in_flight: Arc<AtomicUsize>,
    max_fonts_in_flight: Arc<AtomicUsize>,
    faces: Arc<Mutex<Vec<Arc<FakeFontFace>>>>,
    attach_elements: AtomicBool,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            elements: Mutex::new(Vec::new()),
            texts: Mutex::new(HashMap::new()),
            fetch_requests: AtomicUsize::new(0),
            render_probe_result: AtomicBool::new(true),
            font_steps: Mutex::new(HashMap::new()),
            font_requests: AtomicUsize::new(0),
            fonts_in_flight: Arc::new(AtomicUsize::new(0)),
            max_fonts_in_flight: Arc::new(AtomicUsize::new(0)),
            faces: Arc::new(Mutex::new(Vec::new())),
            attach_elements: AtomicBool::new(true),
        }
    }

    /// Whether new elements come back attached to the document
    ///
    /// Defaults to `true`, like a host honoring the `create_element` contract.
    pub fn set_attach_elements(&self, attach: bool) {
        self.attach_elements.store(attach, Ordering::SeqCst);
    }

    /// Events replayed by elements whose source is `url`
    pub fn script(&self, url: &str, steps: Vec<Step>) {
        lock(&self.scripts).insert(url.to_string(), steps);
    }

    /// Response for `fetch_text(url)`
    pub fn respond_text(&self, url: &str, delay: Duration, response: MediaResult<String>) {
        lock(&self.texts).insert(url.to_string(), (delay, response));
    }

    pub fn set_render_probe(&self, renders: bool) {
        self.render_probe_result.store(renders, Ordering::SeqCst);
    }

    /// Outcomes of successive font registrations for `url`
    ///
    /// Once the queue is exhausted registrations succeed after 10ms.
    pub fn script_font(&self, url: &str, steps: Vec<FontStep>) {
        lock(&self.font_steps).insert(url.to_string(), steps.into());
    }

    /// Every element created so far
    pub fn elements(&self) -> Vec<Arc<FakeElement>> {
        lock(&self.elements).clone()
    }

    /// The most recently created element
    pub fn last_element(&self) -> Option<Arc<FakeElement>> {
        lock(&self.elements).last().cloned()
    }

    pub fn fetch_requests(&self) -> usize {
        self.fetch_requests.load(Ordering::SeqCst)
    }

    pub fn font_requests(&self) -> usize {
        self.font_requests.load(Ordering::SeqCst)
    }

    pub fn max_fonts_in_flight(&self) -> usize {
        self.max_fonts_in_flight.load(Ordering::SeqCst)
    }

    /// Every font face registered so far
    pub fn faces(&self) -> Vec<Arc<FakeFontFace>> {
        lock(&self.faces).clone()
    }
}

impl MediaPlatform for FakePlatform {
    fn create_element(&self, kind: ElementKind) -> ElementHandle {
        let element = FakeElement::build(kind, Some(self.scripts.clone()));
        element.set_connected(self.attach_elements.load(Ordering::SeqCst));
        lock(&self.elements).push(element.clone());
        element
    }

    fn fetch_text(&self, url: &str) -> BoxFuture<'static, MediaResult<String>> {
        self.fetch_requests.fetch_add(1, Ordering::SeqCst);
        let (delay, response) = lock(&self.texts)
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                (
                    Duration::from_millis(10),
                    Err(MediaError::NetworkOrDecode("404".to_string())),
                )
            });

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            response
        })
    }

    fn render_probe(&self, _markup: &str) -> BoxFuture<'static, bool> {
        let renders = self.render_probe_result.load(Ordering::SeqCst);
        Box::pin(async move { renders })
    }

    fn load_font_face(
        &self,
        family: &str,
        url: &str,
        _display: FontDisplay,
    ) -> BoxFuture<'static, MediaResult<FontHandle>> {
        self.font_requests.fetch_add(1, Ordering::SeqCst);
        let step = lock(&self.font_steps)
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(FontStep::Succeed(Duration::from_millis(10)));

        let in_flight = self.fonts_in_flight.clone();
        let peak = self.max_fonts_in_flight.clone();
        let faces = self.faces.clone();
        let family = family.to_string();

        Box::pin(async move {
            let _in_flight = InFlight::enter(in_flight, &peak);
            match step {
                FontStep::Succeed(delay) => {
                    tokio::time::sleep(delay).await;
                    let face = Arc::new(FakeFontFace {
                        family,
                        releases: AtomicUsize::new(0),
                    });
                    lock(&faces).push(face.clone());
                    let handle: FontHandle = face;
                    Ok(handle)
                }
                FontStep::Fail(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(MediaError::NetworkOrDecode("font fetch failed".to_string()))
                }
                FontStep::Hang => futures::future::pending().await,
            }
        })
    }
}

/// Sanitizer that keeps markup unchanged and flags script content
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSanitizer;

impl MarkupSanitizer for PassthroughSanitizer {
    fn sanitize(&self, input: &str) -> String {
        input.to_string()
    }

    fn looks_suspicious(&self, input: &str) -> bool {
        let lowered = input.to_ascii_lowercase();
        lowered.contains("<script") || lowered.contains("javascript:")
    }
}

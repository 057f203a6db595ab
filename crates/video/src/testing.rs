//! Fakes for the video platform and capability probe

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::env::CapabilityProbe;
use crate::manager::VideoPlatform;

/// Video platform with a fixed origin that records revoked object URLs
#[derive(Debug)]
pub struct FakeVideoPlatform {
    origin: String,
    revoked: Mutex<Vec<String>>,
}

impl FakeVideoPlatform {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            revoked: Mutex::new(Vec::new()),
        }
    }

    fn revoked_list(&self) -> MutexGuard<'_, Vec<String>> {
        self.revoked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every revoked object URL, in order
    pub fn revoked(&self) -> Vec<String> {
        self.revoked_list().clone()
    }
}

impl VideoPlatform for FakeVideoPlatform {
    fn app_origin(&self) -> String {
        self.origin.clone()
    }

    fn revoke_object_url(&self, url: &str) {
        self.revoked_list().push(url.to_string());
    }
}

/// Capability probe with every answer configurable, unknown by default
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    user_agent: Option<String>,
    screen_width: Option<u32>,
    coarse_pointer: Option<bool>,
    device_memory_gb: Option<f32>,
}

impl FakeProbe {
    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_string());
        self
    }

    pub fn with_screen(mut self, width: u32, coarse_pointer: bool) -> Self {
        self.screen_width = Some(width);
        self.coarse_pointer = Some(coarse_pointer);
        self
    }

    pub fn with_device_memory(mut self, gigabytes: f32) -> Self {
        self.device_memory_gb = Some(gigabytes);
        self
    }
}

impl CapabilityProbe for FakeProbe {
    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn screen_width(&self) -> Option<u32> {
        self.screen_width
    }

    fn coarse_pointer(&self) -> Option<bool> {
        self.coarse_pointer
    }

    fn device_memory_gb(&self) -> Option<f32> {
        self.device_memory_gb
    }
}

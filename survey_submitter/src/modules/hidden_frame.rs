use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

// Keeps track of the transient off-screen frames a fallback submission opens
// A frame lives exactly as long as its TransientFrame handle, dropping the
// handle removes it whichever way the submission ended
#[derive(Clone, Default)]
pub struct FrameHost {
    frames: Arc<Mutex<HashSet<Uuid>>>,
}

impl FrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> TransientFrame {
        let id = Uuid::new_v4();
        self.with_frames(|frames| {
            frames.insert(id);
        });
        log::debug!("Opened submission frame {}", id);
        TransientFrame { id, host: self.clone() }
    }

    // Number of frames currently attached
    pub fn live_frames(&self) -> usize {
        let mut count = 0;
        self.with_frames(|frames| count = frames.len());
        count
    }

    fn with_frames<F: FnOnce(&mut HashSet<Uuid>)>(&self, f: F) {
        match self.frames.lock() {
            Ok(mut frames) => f(&mut frames),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

pub struct TransientFrame {
    id: Uuid,
    host: FrameHost,
}

impl TransientFrame {
    // Target name the hidden form posts into
    pub fn name(&self) -> String {
        format!("submission_frame_{}", self.id.simple())
    }
}

impl Drop for TransientFrame {
    fn drop(&mut self) {
        let id = self.id;
        self.host.with_frames(|frames| {
            frames.remove(&id);
        });
        log::debug!("Removed submission frame {}", id);
    }
}

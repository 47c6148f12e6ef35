//! Playlist manager (spec §4.9): a message-looper wrapping a [`Player`] and an ordered list
//! of URIs, reacting to the player's own state transitions rather than driving it by polling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::adapter::{SinkAdapter, SourceAdapter};
use crate::events::PlayerState;
use crate::player::Player;

/// Messages the manager's loop thread reacts to, mirroring the "post STOP -> post RESET ->
/// advance index -> post SET_SOURCE" chain spec §4.9 describes.
enum Message {
    PlayerTransitioned(PlayerState),
    Next,
    Prev,
    Shutdown,
}

/// Wraps a [`Player`] plus a playlist. Owns one background thread that serializes every
/// reaction to player-state transitions, so `next`/`prev` calls never race the completion
/// handler.
pub struct PlaylistManager<A, S>
where
    A: SourceAdapter + 'static,
    A::Handle: Send,
    S: SinkAdapter + 'static,
    S::Handle: Send,
{
    player: Arc<Player<A, S>>,
    uris: Mutex<Vec<String>>,
    index: AtomicUsize,
    single_looping: AtomicBool,
    tx: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<A, S> PlaylistManager<A, S>
where
    A: SourceAdapter + 'static,
    A::Handle: Send,
    S: SinkAdapter + 'static,
    S::Handle: Send,
{
    pub fn new(player: Arc<Player<A, S>>, uris: Vec<String>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        let manager = Arc::new(Self {
            player: player.clone(),
            uris: Mutex::new(uris),
            index: AtomicUsize::new(0),
            single_looping: AtomicBool::new(false),
            tx: tx.clone(),
            handle: Mutex::new(None),
        });

        let loop_manager = manager.clone();
        let handle = std::thread::spawn(move || {
            for msg in rx {
                match msg {
                    Message::PlayerTransitioned(state) => loop_manager.on_player_state(state),
                    Message::Next => loop_manager.advance(1),
                    Message::Prev => loop_manager.advance(-1),
                    Message::Shutdown => break,
                }
            }
        });
        *manager.handle.lock().unwrap() = Some(handle);

        let listener_tx = tx;
        player.register_state_listener(Box::new(move |state| {
            let _ = listener_tx.send(Message::PlayerTransitioned(state));
        }));

        manager
    }

    pub fn set_single_looping(&self, looping: bool) {
        self.single_looping.store(looping, Ordering::SeqCst);
    }

    pub fn next(&self) {
        let _ = self.tx.send(Message::Next);
    }

    pub fn prev(&self) {
        let _ = self.tx.send(Message::Prev);
    }

    fn on_player_state(&self, state: PlayerState) {
        let list_len = self.uris.lock().unwrap().len();
        if list_len == 0 {
            return;
        }
        match state {
            PlayerState::Completed => {
                let _ = self.player.stop();
            }
            PlayerState::Stopped => {
                let _ = self.player.reset();
            }
            PlayerState::Idle => {
                if !self.single_looping.load(Ordering::SeqCst) {
                    self.advance_index(1);
                }
                self.open_current();
            }
            _ => {}
        }
    }

    fn advance(&self, delta: i64) {
        self.advance_index(delta);
        let _ = self.player.stop();
    }

    fn advance_index(&self, delta: i64) {
        let len = self.uris.lock().unwrap().len();
        if len == 0 {
            return;
        }
        let current = self.index.load(Ordering::SeqCst) as i64;
        let next = (current + delta).rem_euclid(len as i64);
        self.index.store(next as usize, Ordering::SeqCst);
    }

    fn open_current(&self) {
        let uri = {
            let uris = self.uris.lock().unwrap();
            let idx = self.index.load(Ordering::SeqCst);
            uris.get(idx).cloned()
        };
        if let Some(uri) = uri {
            if self.player.set_data_source(uri).is_ok() {
                let _ = self.player.prepare_async();
            }
        }
    }
}

impl<A, S> Drop for PlaylistManager<A, S>
where
    A: SourceAdapter + 'static,
    A::Handle: Send,
    S: SinkAdapter + 'static,
    S::Handle: Send,
{
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

//! Push key generation.
//!
//! Keys are 20 characters: 8 characters encoding the millisecond timestamp,
//! then 12 random characters. Within the same millisecond the random part is
//! incremented instead of regenerated, so keys from one generator sort in
//! creation order.

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Source of child keys for `push`.
pub trait KeyGenerator {
    fn next_key(&mut self) -> String;
}

/// Chronologically ordered push keys.
#[derive(Debug, Default)]
pub struct PushKeys {
    last_time: i64,
    last_random: [u8; 12],
}

impl PushKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key as if the clock read `now_ms`.
    ///
    /// A clock that moves backwards is treated as standing still.
    pub fn next_key_at(&mut self, now_ms: i64) -> String {
        let now = now_ms.max(self.last_time);
        if now == self.last_time {
            self.increment_random();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }
        self.last_time = now;

        let mut time_chars = [0u8; 8];
        let mut remaining = now;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }

        let mut key = String::with_capacity(20);
        key.extend(time_chars.iter().map(|&c| c as char));
        key.extend(
            self.last_random
                .iter()
                .map(|&i| PUSH_CHARS[i as usize] as char),
        );
        key
    }

    fn increment_random(&mut self) {
        for slot in self.last_random.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                return;
            }
        }
    }
}

impl KeyGenerator for PushKeys {
    fn next_key(&mut self) -> String {
        self.next_key_at(chrono::Utc::now().timestamp_millis())
    }
}

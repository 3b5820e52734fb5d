use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 12;

/// Generates the 20 character keys used by `child_by_auto_id`: eight characters
/// of millisecond timestamp followed by twelve random characters. Keys created
/// within the same millisecond increment the random part, so keys from one
/// generator always sort in creation order.
#[derive(Debug, Default)]
pub(crate) struct PushIdGenerator {
    last_time: u64,
    last_random: [u8; RANDOM_LEN],
}

impl PushIdGenerator {
    pub(crate) fn next_id(&mut self, now: u64) -> String {
        if now == self.last_time {
            self.increment_random();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }
        self.last_time = now;

        let mut id = String::with_capacity(8 + RANDOM_LEN);
        let mut remaining = now;
        let mut timestamp = [0u8; 8];
        for slot in timestamp.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        id.extend(timestamp.iter().map(|ch| *ch as char));
        id.extend(
            self.last_random
                .iter()
                .map(|index| PUSH_CHARS[*index as usize] as char),
        );
        id
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

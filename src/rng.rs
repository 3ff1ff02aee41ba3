/// Numerical Recipes LCG. All AI randomness (pauses, turn direction)
/// flows through one seeded instance so a simulation replays identically.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        // A zero seed would lock the generator on zero
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Random value in [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        self.next_u32() % max.max(1)
    }

    /// True with probability num/den
    pub fn chance(&mut self, num: u32, den: u32) -> bool {
        self.next_range(den) < num
    }

    pub fn coin(&mut self) -> bool {
        self.next_u32() & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Rng::new(12345);
        let mut b = Rng::new(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn range_stays_in_bounds() {
        let mut rng = Rng::new(7);
        for _ in 0..1000 {
            assert!(rng.next_range(6) < 6);
        }
    }

    #[test]
    fn zero_seed_does_not_stick() {
        let mut rng = Rng::new(0);
        let first = rng.next_u32();
        assert_ne!(first, rng.next_u32());
    }
}

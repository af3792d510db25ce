//! Shared streaming-statistics building blocks used by `stats`,
//! `normalize`, and `sample`: Welford mean/variance, the P² quantile
//! estimator, a HyperLogLog sketch, an adaptive histogram, Algorithm R
//! reservoir sampling, and the xorshift RNG backing both.

/// A small, fast, deterministic PRNG — not cryptographic, used only to
/// pick reservoir slots. A fixed seed makes `sample`/`stats` runs
/// reproducible, matching the engine's DETERMINISTIC capability bit.
pub struct Xorshift {
    state: u64,
}

impl Xorshift {
    pub fn new(seed: u64) -> Self {
        Xorshift {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform integer in `[0, bound)`.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }
}

/// Numerically stable online mean and variance (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct Welford {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
    pub m3: f64,
    pub m4: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Welford {
    pub fn new() -> Self {
        Welford {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Default::default()
        }
    }

    /// Updates mean, the second..fourth central moments (for variance,
    /// skewness, kurtosis), min/max, and the running sum in one pass.
    pub fn update(&mut self, x: f64) {
        let n1 = self.count;
        self.count += 1;
        let n = self.count as f64;
        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1 as f64;
        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0)
            + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
        self.sum += x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn skewness(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        (n.sqrt() * self.m3) / self.m2.powf(1.5)
    }

    pub fn kurtosis(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        (n * self.m4) / (self.m2 * self.m2) - 3.0
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Jain-Chlamtac P² online quantile estimator for a single quantile
/// `tau`, using five markers. Exact for the first 5 samples.
#[derive(Debug, Clone)]
pub struct P2Estimator {
    tau: f64,
    initial: Vec<f64>,
    heights: [f64; 5],
    positions: [f64; 5],
    desired: [f64; 5],
    increments: [f64; 5],
    initialized: bool,
}

impl P2Estimator {
    pub fn new(tau: f64) -> Self {
        P2Estimator {
            tau,
            initial: Vec::with_capacity(5),
            heights: [0.0; 5],
            positions: [1.0, 2.0, 3.0, 4.0, 5.0],
            desired: [0.0; 5],
            increments: [0.0, tau / 2.0, tau, (1.0 + tau) / 2.0, 1.0],
            initialized: false,
        }
    }

    pub fn update(&mut self, x: f64) {
        if !self.initialized {
            self.initial.push(x);
            if self.initial.len() == 5 {
                self.initial.sort_by(|a, b| a.partial_cmp(b).unwrap());
                for i in 0..5 {
                    self.heights[i] = self.initial[i];
                }
                self.desired = [
                    1.0,
                    1.0 + 2.0 * self.tau,
                    1.0 + 4.0 * self.tau,
                    3.0 + 2.0 * self.tau,
                    5.0,
                ];
                self.initialized = true;
            }
            return;
        }

        let k = if x < self.heights[0] {
            self.heights[0] = x;
            0
        } else if x >= self.heights[4] {
            self.heights[4] = x;
            3
        } else {
            let mut k = 3;
            for i in 0..4 {
                if x < self.heights[i + 1] {
                    k = i;
                    break;
                }
            }
            k
        };

        for i in (k + 1)..5 {
            self.positions[i] += 1.0;
        }
        for i in 0..5 {
            self.desired[i] += self.increments[i];
        }

        for i in 1..4 {
            let d = self.desired[i] - self.positions[i];
            if (d >= 1.0 && self.positions[i + 1] - self.positions[i] > 1.0)
                || (d <= -1.0 && self.positions[i - 1] - self.positions[i] < -1.0)
            {
                let sign = if d >= 0.0 { 1.0 } else { -1.0 };
                let parabolic = self.heights[i]
                    + sign / (self.positions[i + 1] - self.positions[i - 1])
                        * ((self.positions[i] - self.positions[i - 1] + sign)
                            * (self.heights[i + 1] - self.heights[i])
                            / (self.positions[i + 1] - self.positions[i])
                            + (self.positions[i + 1] - self.positions[i] - sign)
                                * (self.heights[i] - self.heights[i - 1])
                                / (self.positions[i] - self.positions[i - 1]));
                let new_height = if self.heights[i - 1] < parabolic && parabolic < self.heights[i + 1] {
                    parabolic
                } else {
                    self.heights[i]
                        + sign * (self.heights[(i as i64 + sign as i64) as usize] - self.heights[i])
                            / (self.positions[(i as i64 + sign as i64) as usize] - self.positions[i])
                };
                self.heights[i] = new_height;
                self.positions[i] += sign;
            }
        }
    }

    /// Returns the quantile estimate, or the exact value from the
    /// partial sample when fewer than 5 observations have been seen.
    pub fn quantile(&self) -> Option<f64> {
        if self.initialized {
            return Some(self.heights[2]);
        }
        if self.initial.is_empty() {
            return None;
        }
        let mut sorted = self.initial.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * self.tau).round() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

const HLL_P: u32 = 10;
const HLL_M: usize = 1 << HLL_P;

/// HyperLogLog cardinality sketch, p=10 (1024 registers), using a
/// 32-bit FNV-style hash mix and the standard small/large-range bias
/// corrections.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        HyperLogLog {
            registers: vec![0u8; HLL_M],
        }
    }

    fn hash(s: &str) -> u32 {
        let mut h: u32 = 0x811c_9dc5;
        for b in s.as_bytes() {
            h ^= *b as u32;
            h = h.wrapping_mul(0x0100_0193);
        }
        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;
        h
    }

    pub fn add(&mut self, s: &str) {
        let hash = Self::hash(s);
        let idx = (hash >> (32 - HLL_P)) as usize;
        let rest = hash << HLL_P | (1 << (HLL_P - 1));
        let rho = (rest.leading_zeros() + 1) as u8;
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    pub fn estimate(&self) -> f64 {
        let m = HLL_M as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
        let raw = alpha * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            return m * (m / zeros as f64).ln();
        }
        let two_32 = 2f64.powi(32);
        if raw > two_32 / 30.0 {
            return -two_32 * (1.0 - raw / two_32).ln();
        }
        raw
    }
}

/// Adaptive histogram: 32 fixed bins over a range that doubles (and
/// merges adjacent bin pairs) whenever an observation falls outside it.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: usize,
    lo: f64,
    hi: f64,
    counts: Vec<u64>,
    initialized: bool,
}

impl Histogram {
    pub fn new(bins: usize) -> Self {
        Histogram {
            bins,
            lo: 0.0,
            hi: 0.0,
            counts: vec![0; bins],
            initialized: false,
        }
    }

    fn expand_to_cover(&mut self, x: f64) {
        while x < self.lo || x >= self.hi {
            let width = self.hi - self.lo;
            if x < self.lo {
                self.lo -= width.max(1.0);
            } else {
                self.hi += width.max(1.0);
            }
            let mut merged = vec![0u64; self.bins];
            for (i, &c) in self.counts.iter().enumerate() {
                merged[i / 2] += c;
            }
            self.counts = merged;
        }
    }

    pub fn update(&mut self, x: f64) {
        if !self.initialized {
            self.lo = x - 0.5;
            self.hi = x + 0.5;
            self.initialized = true;
        }
        self.expand_to_cover(x);
        let width = (self.hi - self.lo) / self.bins as f64;
        let idx = (((x - self.lo) / width) as usize).min(self.bins - 1);
        self.counts[idx] += 1;
    }

    pub fn bins(&self) -> &[u64] {
        &self.counts
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }
}

/// Algorithm R reservoir sample of fixed size, carrying its own RNG so
/// callers (e.g. `stats`) don't have to thread one through.
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    size: usize,
    seen: u64,
    items: Vec<T>,
    rng_state: u64,
}

impl<T: Clone> Reservoir<T> {
    pub fn new(size: usize, seed: u64) -> Self {
        Reservoir {
            size,
            seen: 0,
            items: Vec::with_capacity(size),
            rng_state: if seed == 0 { 0x2545_F491_4F6C_DD1D } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }

    pub fn update(&mut self, item: T) {
        let i = self.seen;
        self.seen += 1;
        if self.items.len() < self.size {
            self.items.push(item);
            return;
        }
        if self.size == 0 {
            return;
        }
        let j = self.next_u64() % (i + 1);
        if (j as usize) < self.size {
            self.items[j as usize] = item;
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_naive_mean_and_variance() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut w = Welford::new();
        for x in xs {
            w.update(x);
        }
        assert!((w.mean - 5.0).abs() < 1e-9);
        assert!((w.variance() - 4.5714285714).abs() < 1e-6);
    }

    #[test]
    fn p2_exact_for_small_sample() {
        let mut p2 = P2Estimator::new(0.5);
        for x in [3.0, 1.0, 2.0] {
            p2.update(x);
        }
        assert_eq!(p2.quantile(), Some(2.0));
    }

    #[test]
    fn p2_converges_reasonably_on_uniform_data() {
        let mut p2 = P2Estimator::new(0.5);
        for i in 0..1000 {
            p2.update(i as f64);
        }
        let median = p2.quantile().unwrap();
        assert!((median - 500.0).abs() < 50.0);
    }

    #[test]
    fn hyperloglog_estimates_within_tolerance() {
        let mut hll = HyperLogLog::new();
        for i in 0..10_000 {
            hll.add(&format!("item-{i}"));
        }
        let estimate = hll.estimate();
        assert!((estimate - 10_000.0).abs() / 10_000.0 < 0.1);
    }

    #[test]
    fn histogram_expands_to_cover_outliers() {
        let mut h = Histogram::new(32);
        for x in [1.0, 2.0, 3.0, 1000.0] {
            h.update(x);
        }
        let (lo, hi) = h.bounds();
        assert!(lo <= 1.0 && hi >= 1000.0);
        assert_eq!(h.bins().iter().sum::<u64>(), 4);
    }

    #[test]
    fn reservoir_never_exceeds_size() {
        let mut r = Reservoir::new(5, 7);
        for i in 0..100 {
            r.update(i);
        }
        assert_eq!(r.items().len(), 5);
    }
}

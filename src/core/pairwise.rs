//! # Pairwise Generation Module / 两两组合生成模块
//!
//! Deterministic pairwise test-case generation: given the candidate-value
//! counts of each parameter (the "dimensions"), produce a reduced set of
//! cases guaranteeing that every 2-way combination of values across any two
//! parameters appears in at least one case.
//!
//! The generator is based on the "jenny" tool by Bob Jenkins
//! (http://burtleburtle.net/bob/math/jenny.html) and is seeded with a fixed
//! prime, so the output is a pure function of the input dimensions.
//!
//! 确定性的两两组合测试用例生成：给定每个参数的候选值数量（"维度"），
//! 生成一个缩减的用例集合，保证任意两个参数之间的每个二元值组合
//! 至少出现在一个用例中。
//! 生成器基于 Bob Jenkins 的 "jenny" 工具，使用固定素数作为种子，
//! 因此输出是输入维度的纯函数。

/// FleaRand is a small pseudo-random number generator by Bob Jenkins
/// (http://burtleburtle.net/bob/rand/talksmall.html#flea). All arithmetic is
/// wrapping 32-bit, matching the reference implementation.
struct FleaRand {
    b: u32,
    c: u32,
    d: u32,
    z: u32,
    m: [u32; 256],
    r: [u32; 256],
    q: usize,
}

impl FleaRand {
    fn new(seed: u32) -> Self {
        let mut prng = Self {
            b: seed,
            c: seed,
            d: seed,
            z: seed,
            m: [seed; 256],
            r: [0; 256],
            q: 0,
        };
        for _ in 0..10 {
            prng.batch();
        }
        prng.q = 0;
        prng
    }

    fn next(&mut self) -> u32 {
        if self.q == 0 {
            self.batch();
            self.q = self.r.len() - 1;
        } else {
            self.q -= 1;
        }
        self.r[self.q]
    }

    fn batch(&mut self) {
        let mut b = self.b;
        self.z = self.z.wrapping_add(1);
        let mut c = self.c.wrapping_add(self.z);
        let mut d = self.d;

        for i in 0..self.r.len() {
            let a = self.m[(b as usize) % self.m.len()];
            self.m[(b as usize) % self.m.len()] = d;
            d = (c << 19).wrapping_add(c >> 13).wrapping_add(b);
            c = b ^ self.m[i];
            b = a.wrapping_add(d);
            self.r[i] = c;
        }

        self.b = b;
        self.c = c;
        self.d = d;
    }
}

/// One value of one parameter: `(dimension, feature)` index pair.
/// 一个参数的一个值：`(维度, 特征)` 索引对。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeatureInfo {
    dimension: usize,
    feature: usize,
}

/// A combination of one or two features a generated case should cover.
#[derive(Debug, Clone)]
struct FeatureTuple {
    features: Vec<FeatureInfo>,
}

impl FeatureTuple {
    fn single(feature: FeatureInfo) -> Self {
        Self { features: vec![feature] }
    }

    fn pair(first: FeatureInfo, second: FeatureInfo) -> Self {
        Self { features: vec![first, second] }
    }
}

/// One generated case: the chosen feature index for every dimension.
/// 一个生成的用例：每个维度所选的特征索引。
#[derive(Debug, Clone)]
pub struct PairwiseCase {
    pub features: Vec<usize>,
}

impl PairwiseCase {
    fn new(length: usize) -> Self {
        Self { features: vec![0; length] }
    }

    fn covers(&self, tuple: &FeatureTuple) -> bool {
        tuple
            .features
            .iter()
            .all(|f| self.features[f.dimension] == f.feature)
    }
}

/// The pairwise generator. Holds the uncovered-tuple index, keyed by
/// dimension and feature so that coverage counting stays cheap.
struct PairwiseGenerator {
    prng: FleaRand,
    dimensions: Vec<usize>,
    uncovered: Vec<Vec<Vec<FeatureTuple>>>,
}

/// Generates a deterministic pairwise case set for the given dimensions.
/// Returns an empty set when any dimension is empty; the generated count is
/// never below the largest single dimension's candidate count.
///
/// 为给定维度生成确定性的两两组合用例集合。
/// 任一维度为空时返回空集合；生成的数量不会低于最大维度的候选值数量。
pub fn generate(dimensions: &[usize]) -> Vec<PairwiseCase> {
    if dimensions.is_empty() || dimensions.iter().any(|&d| d == 0) {
        return Vec::new();
    }

    let mut generator = PairwiseGenerator {
        prng: FleaRand::new(15485863),
        dimensions: dimensions.to_vec(),
        uncovered: Vec::new(),
    };
    generator.run()
}

impl PairwiseGenerator {
    fn run(&mut self) -> Vec<PairwiseCase> {
        self.create_all_tuples();

        let mut cases = Vec::new();
        while let Some(tuple) = self.next_tuple() {
            let case = self.create_case(&tuple);
            self.remove_covered_tuples(&case);
            cases.push(case);
        }
        cases
    }

    fn next_random(&mut self) -> usize {
        (self.prng.next() >> 1) as usize
    }

    fn create_all_tuples(&mut self) {
        self.uncovered = (0..self.dimensions.len())
            .map(|d| {
                (0..self.dimensions[d])
                    .map(|f| self.create_tuples(d, f))
                    .collect()
            })
            .collect();
    }

    fn create_tuples(&self, dimension: usize, feature: usize) -> Vec<FeatureTuple> {
        let first = FeatureInfo { dimension, feature };
        let mut result = vec![FeatureTuple::single(first)];
        for d in 0..self.dimensions.len() {
            if d != dimension {
                for f in 0..self.dimensions[d] {
                    result.push(FeatureTuple::pair(first, FeatureInfo { dimension: d, feature: f }));
                }
            }
        }
        result
    }

    fn next_tuple(&mut self) -> Option<FeatureTuple> {
        for per_dimension in &mut self.uncovered {
            for tuples in per_dimension {
                if !tuples.is_empty() {
                    return Some(tuples.remove(0));
                }
            }
        }
        None
    }

    fn create_case(&mut self, tuple: &FeatureTuple) -> PairwiseCase {
        let mut best_case = None;
        let mut best_coverage = -1i64;

        // Seven random starts per tuple gives good results in acceptable time.
        for _ in 0..7 {
            let mut case = self.create_random_case(tuple);
            let coverage = self.maximize_coverage(&mut case, tuple) as i64;
            if coverage > best_coverage {
                best_case = Some(case);
                best_coverage = coverage;
            }
        }

        best_case.unwrap_or_else(|| PairwiseCase::new(self.dimensions.len()))
    }

    fn create_random_case(&mut self, tuple: &FeatureTuple) -> PairwiseCase {
        let mut case = PairwiseCase::new(self.dimensions.len());
        for d in 0..self.dimensions.len() {
            case.features[d] = self.next_random() % self.dimensions[d];
        }
        for f in &tuple.features {
            case.features[f.dimension] = f.feature;
        }
        case
    }

    fn maximize_coverage(&mut self, case: &mut PairwiseCase, tuple: &FeatureTuple) -> usize {
        // Starts at one because the selected tuple is always covered.
        let mut total_coverage = 1;
        let mut mutable_dimensions = self.mutable_dimensions(tuple);

        loop {
            let mut progress = false;
            self.scramble_dimensions(&mut mutable_dimensions);

            for i in 0..mutable_dimensions.len() {
                let d = mutable_dimensions[i];
                let best_coverage = self.count_covered_tuples(case, d, case.features[d]);
                let new_coverage = self.maximize_dimension(case, d, best_coverage);
                total_coverage += new_coverage;
                if new_coverage > best_coverage {
                    progress = true;
                }
            }

            if !progress {
                return total_coverage;
            }
        }
    }

    fn mutable_dimensions(&self, tuple: &FeatureTuple) -> Vec<usize> {
        let mut immutable = vec![false; self.dimensions.len()];
        for f in &tuple.features {
            immutable[f.dimension] = true;
        }
        (0..self.dimensions.len()).filter(|&d| !immutable[d]).collect()
    }

    fn scramble_dimensions(&mut self, dimensions: &mut [usize]) {
        if dimensions.is_empty() {
            return;
        }
        for i in 0..dimensions.len() {
            let j = self.next_random() % dimensions.len();
            dimensions.swap(i, j);
        }
    }

    fn maximize_dimension(
        &mut self,
        case: &mut PairwiseCase,
        dimension: usize,
        mut best_coverage: usize,
    ) -> usize {
        let mut best_features = Vec::with_capacity(self.dimensions[dimension]);

        for f in 0..self.dimensions[dimension] {
            case.features[dimension] = f;
            let coverage = self.count_covered_tuples(case, dimension, f);
            if coverage >= best_coverage {
                if coverage > best_coverage {
                    best_coverage = coverage;
                    best_features.clear();
                }
                best_features.push(f);
            }
        }

        case.features[dimension] = best_features[self.next_random() % best_features.len()];
        best_coverage
    }

    fn count_covered_tuples(&self, case: &PairwiseCase, dimension: usize, feature: usize) -> usize {
        self.uncovered[dimension][feature]
            .iter()
            .filter(|t| case.covers(t))
            .count()
    }

    fn remove_covered_tuples(&mut self, case: &PairwiseCase) {
        for per_dimension in &mut self.uncovered {
            for tuples in per_dimension.iter_mut() {
                tuples.retain(|t| !case.covers(t));
            }
        }
    }
}

/// Checks that every 2-way value combination across any two dimensions is
/// covered by at least one case. Used by the expansion tests.
pub fn covers_all_pairs(dimensions: &[usize], cases: &[PairwiseCase]) -> bool {
    for d1 in 0..dimensions.len() {
        for d2 in (d1 + 1)..dimensions.len() {
            for f1 in 0..dimensions[d1] {
                for f2 in 0..dimensions[d2] {
                    let tuple = FeatureTuple::pair(
                        FeatureInfo { dimension: d1, feature: f1 },
                        FeatureInfo { dimension: d2, feature: f2 },
                    );
                    if !cases.iter().any(|c| c.covers(&tuple)) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

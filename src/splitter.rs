//! Splitter
//!
//! Scores threshold splits of a binding population under multi-instance
//! semantics. A bag goes to a branch if any of its bindings does, and bags
//! reaching both `yes` and `no` are claimed by whichever of the two has the
//! higher fraction of positive bags.
use crate::bag::BindingBag;
use crate::data::EntityPool;
use crate::errors::ConcunoError;
use crate::function::{Function, FunctionSignature};
use crate::utils::{entropy, gini, midpoints, positive_fraction};
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Impurity measure over bag level label counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl Criterion {
    pub fn impurity(&self, counts: BagCounts) -> f64 {
        match self {
            Criterion::Gini => gini(counts.positive, counts.negative),
            Criterion::Entropy => entropy(counts.positive, counts.negative),
        }
    }
}

/// Positive and negative bag counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BagCounts {
    pub positive: usize,
    pub negative: usize,
}

impl BagCounts {
    pub fn new(positive: usize, negative: usize) -> Self {
        BagCounts { positive, negative }
    }

    pub fn of_labels<'a>(labels: impl Iterator<Item = &'a bool>) -> Self {
        let mut counts = BagCounts::default();
        for &label in labels {
            counts.add_label(label);
        }
        counts
    }

    pub fn add_label(&mut self, label: bool) {
        if label {
            self.positive += 1;
        } else {
            self.negative += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative
    }

    pub fn fraction(&self) -> f64 {
        positive_fraction(self.positive, self.negative)
    }
}

impl Add for BagCounts {
    type Output = BagCounts;
    fn add(self, other: BagCounts) -> BagCounts {
        BagCounts::new(self.positive + other.positive, self.negative + other.negative)
    }
}

/// Assign each bag to exactly one branch.
///
/// `both` are bags with bindings on each side of the threshold, `neither`
/// bags without a single valid binding. The side with the higher positive
/// fraction claims the shared bags, `yes` winning ties.
pub fn claim(yes_only: BagCounts, no_only: BagCounts, both: BagCounts, neither: BagCounts) -> [BagCounts; 3] {
    let yes_all = yes_only + both;
    let no_all = no_only + both;
    let yes_first = yes_all.total() > 0 && (no_all.total() == 0 || yes_all.fraction() >= no_all.fraction());
    if yes_first {
        [yes_all, no_only, neither]
    } else {
        [yes_only, no_all, neither]
    }
}

/// Best threshold found for one function and variable assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitInfo {
    pub split_gain: f64,
    pub component: usize,
    pub threshold: f64,
    pub yes: BagCounts,
    pub no: BagCounts,
    pub err: BagCounts,
}

/// Value range of one bag on every output component, `None` without any
/// valid binding.
struct BagRange {
    label: bool,
    ranges: Option<Vec<(f64, f64)>>,
}

/// Sorted bag minima and maxima for one label.
#[derive(Default)]
struct Bounds {
    mins: Vec<f64>,
    maxs: Vec<f64>,
    invalid: usize,
}

impl Bounds {
    fn sort(&mut self) {
        self.mins.sort_by(|a, b| a.total_cmp(b));
        self.maxs.sort_by(|a, b| a.total_cmp(b));
    }

    /// Bags entirely below, entirely at or above, and straddling `t`.
    fn count(&self, t: f64) -> (usize, usize, usize) {
        let yes_only = self.maxs.partition_point(|&m| m < t);
        let no_only = self.mins.len() - self.mins.partition_point(|&m| m < t);
        (yes_only, no_only, self.mins.len() - yes_only - no_only)
    }
}

pub struct Splitter {
    pub criterion: Criterion,
}

impl Splitter {
    pub fn new(criterion: Criterion) -> Self {
        Splitter { criterion }
    }

    /// Weighted child impurity subtracted from the parent's.
    pub fn gain(&self, parent: BagCounts, kids: &[BagCounts; 3]) -> f64 {
        let n = parent.total() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let weighted: f64 = kids
            .iter()
            .map(|k| k.total() as f64 / n * self.criterion.impurity(*k))
            .sum();
        self.criterion.impurity(parent) - weighted
    }

    /// Search every component and threshold of `function` over the
    /// population. Thresholds are midpoints between consecutive distinct
    /// binding values, and ties keep the lowest component and threshold.
    pub fn best_split(
        &self,
        pool: &EntityPool,
        function: &Function,
        signature: &FunctionSignature,
        var_indices: &[usize],
        population: &[BindingBag],
    ) -> Result<Option<SplitInfo>, ConcunoError> {
        let mut bag_ranges = Vec::with_capacity(population.len());
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); signature.components];
        for bindings in population {
            let mut ranges: Option<Vec<(f64, f64)>> = None;
            for binding in bindings.bindings() {
                let Some(v) = function.evaluate_binding(pool, signature, binding, var_indices)? else {
                    continue;
                };
                match ranges.as_mut() {
                    Some(r) => {
                        for (range, x) in r.iter_mut().zip(v.iter()) {
                            range.0 = range.0.min(*x);
                            range.1 = range.1.max(*x);
                        }
                    }
                    None => ranges = Some(v.iter().map(|x| (*x, *x)).collect()),
                }
                for (component, x) in values.iter_mut().zip(v) {
                    component.push(x);
                }
            }
            bag_ranges.push(BagRange {
                label: bindings.label,
                ranges,
            });
        }

        let parent = BagCounts::of_labels(bag_ranges.iter().map(|b| &b.label));
        let mut best: Option<SplitInfo> = None;
        for (component, mut component_values) in values.into_iter().enumerate() {
            component_values.sort_by(|a, b| a.total_cmp(b));
            let (mut pos, mut neg) = (Bounds::default(), Bounds::default());
            for bag in &bag_ranges {
                let bounds = if bag.label { &mut pos } else { &mut neg };
                match &bag.ranges {
                    Some(r) => {
                        bounds.mins.push(r[component].0);
                        bounds.maxs.push(r[component].1);
                    }
                    None => bounds.invalid += 1,
                }
            }
            pos.sort();
            neg.sort();
            for threshold in midpoints(&component_values) {
                let (pos_yes, pos_no, pos_both) = pos.count(threshold);
                let (neg_yes, neg_no, neg_both) = neg.count(threshold);
                let kids = claim(
                    BagCounts::new(pos_yes, neg_yes),
                    BagCounts::new(pos_no, neg_no),
                    BagCounts::new(pos_both, neg_both),
                    BagCounts::new(pos.invalid, neg.invalid),
                );
                let split_gain = self.gain(parent, &kids);
                if best.as_ref().map_or(true, |b| split_gain > b.split_gain) {
                    best = Some(SplitInfo {
                        split_gain,
                        component,
                        threshold,
                        yes: kids[0],
                        no: kids[1],
                        err: kids[2],
                    });
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::Bag;
    use crate::data::{encode_scalars, Entity};
    use crate::function::{FunctionOps, GetFunction};
    use crate::schema::{Schema, TypeId};

    struct Fixture {
        schema: Schema,
        pool: EntityPool,
        function: Function,
        signature: FunctionSignature,
        item: TypeId,
    }

    fn fixture() -> Fixture {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let item = schema.add_type("Item", 0).unwrap();
        schema.push_or_expand_property(item, "x", float).unwrap();
        let get: Function = GetFunction::new(&mut schema, item, "x").unwrap().into();
        let function = get.into_relational(&schema).unwrap();
        let signature = function.signature(&schema).unwrap();
        Fixture {
            schema,
            pool: EntityPool::new(),
            function,
            signature,
            item,
        }
    }

    fn population(f: &mut Fixture, bags: &[(bool, Vec<f64>)]) -> Vec<BindingBag> {
        bags.iter()
            .enumerate()
            .map(|(i, (label, xs))| {
                let entities: Vec<Entity> = xs
                    .iter()
                    .map(|x| f.pool.push(&f.schema, f.item, &encode_scalars(&[*x])).unwrap())
                    .collect();
                let bag = Bag::new(*label, entities);
                BindingBag::initial(i, &bag).expand(&f.pool, &bag, f.item).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_claim_prefers_purer_side() {
        let [yes, no, err] = claim(
            BagCounts::new(0, 2),
            BagCounts::new(3, 0),
            BagCounts::new(1, 1),
            BagCounts::new(0, 1),
        );
        // no has fraction 4/5 against yes 1/4, so no claims the shared bags.
        assert_eq!(yes, BagCounts::new(0, 2));
        assert_eq!(no, BagCounts::new(4, 1));
        assert_eq!(err, BagCounts::new(0, 1));

        let [yes, no, _] = claim(
            BagCounts::new(1, 0),
            BagCounts::new(1, 0),
            BagCounts::new(1, 1),
            BagCounts::default(),
        );
        assert_eq!(yes, BagCounts::new(2, 1));
        assert_eq!(no, BagCounts::new(1, 0));
    }

    #[test]
    fn test_gain() {
        let splitter = Splitter::new(Criterion::Gini);
        let parent = BagCounts::new(2, 2);
        let perfect = [BagCounts::new(2, 0), BagCounts::new(0, 2), BagCounts::default()];
        assert_eq!(splitter.gain(parent, &perfect), 0.5);
        let useless = [BagCounts::new(1, 1), BagCounts::new(1, 1), BagCounts::default()];
        assert_eq!(splitter.gain(parent, &useless), 0.0);
        let entropy = Splitter::new(Criterion::Entropy);
        assert_eq!(entropy.gain(parent, &perfect), 1.0);
    }

    #[test]
    fn test_best_split_separates_bags() {
        let mut f = fixture();
        let population = population(&mut f, &[(true, vec![5.0]), (false, vec![1.0])]);
        let splitter = Splitter::new(Criterion::Gini);
        let split = splitter
            .best_split(&f.pool, &f.function, &f.signature, &[0], &population)
            .unwrap()
            .unwrap();
        assert_eq!(split.threshold, 3.0);
        assert_eq!(split.split_gain, 0.5);
        assert_eq!(split.yes, BagCounts::new(0, 1));
        assert_eq!(split.no, BagCounts::new(1, 0));
        assert_eq!(split.err, BagCounts::default());
    }

    #[test]
    fn test_best_split_existential() {
        let mut f = fixture();
        // Positive bags each hold one small value, negatives only large ones.
        let population = population(
            &mut f,
            &[
                (true, vec![9.0, 1.0]),
                (true, vec![2.0, 8.0, 7.0]),
                (false, vec![6.0, 9.0]),
                (false, vec![8.5]),
            ],
        );
        let splitter = Splitter::new(Criterion::Gini);
        let split = splitter
            .best_split(&f.pool, &f.function, &f.signature, &[0], &population)
            .unwrap()
            .unwrap();
        assert!(split.threshold > 2.0 && split.threshold <= 6.0);
        assert_eq!(split.yes, BagCounts::new(2, 0));
        assert_eq!(split.no, BagCounts::new(0, 2));
        assert_eq!(split.split_gain, 0.5);
        assert_eq!(split.threshold, 4.0);
    }

    #[test]
    fn test_unbound_bags_go_to_err() {
        let mut f = fixture();
        let population = population(&mut f, &[(true, vec![5.0]), (false, vec![1.0]), (false, vec![])]);
        assert_eq!(population[2].binding(0), &[None]);
        let split = Splitter::new(Criterion::Gini)
            .best_split(&f.pool, &f.function, &f.signature, &[0], &population)
            .unwrap()
            .unwrap();
        assert_eq!(split.err, BagCounts::new(0, 1));
        assert_eq!(split.threshold, 3.0);
        assert_eq!(f.function.name(), "x");
    }

    #[test]
    fn test_no_threshold_without_distinct_values() {
        let mut f = fixture();
        let population = population(&mut f, &[(true, vec![2.0]), (false, vec![2.0])]);
        let split = Splitter::new(Criterion::Gini)
            .best_split(&f.pool, &f.function, &f.signature, &[0], &population)
            .unwrap();
        assert!(split.is_none());
    }
}

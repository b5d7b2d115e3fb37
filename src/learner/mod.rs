//! Learner
//!
//! Greedy induction of a relational decision tree from labeled bags.
pub mod config;
pub mod expansion;
pub mod setters;

use crate::bag::{Bag, BindingBag};
use crate::data::EntityPool;
use crate::errors::ConcunoError;
use crate::function::{Function, FunctionOps, FunctionSignature};
use crate::grower::PendingNode;
use crate::learner::config::LearnerConfig;
use crate::learner::expansion::{enumerate_expansions, Expansion};
use crate::node::{SplitNode, VarNode};
use crate::schema::{Schema, TypeId};
use crate::splitter::{claim, BagCounts, SplitInfo, Splitter};
use hashbrown::HashMap;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::tree::Tree;

/// A candidate function ready for evaluation over bindings.
#[derive(Clone, Debug)]
struct Candidate {
    function: Function,
    signature: FunctionSignature,
}

/// Tree learner, configured with the builder style setters.
#[derive(Clone, Debug, Default)]
pub struct Learner {
    pub cfg: LearnerConfig,
}

impl Learner {
    pub fn new(cfg: LearnerConfig) -> Self {
        Learner { cfg }
    }

    /// Learn a tree classifying `bags`, splitting on `functions`.
    ///
    /// Functions over entity records are wrapped to read through binding
    /// handles, every other function must take entity pointers. All
    /// functions must return numeric values.
    pub fn learn(
        &self,
        schema: &Schema,
        pool: &EntityPool,
        bags: &[Bag],
        functions: &[Function],
    ) -> Result<Tree, ConcunoError> {
        self.cfg.validate()?;
        if bags.is_empty() {
            return Err(ConcunoError::EmptyInput("no bags to learn from".to_string()));
        }
        if functions.is_empty() {
            return Err(ConcunoError::EmptyInput("no candidate functions".to_string()));
        }
        let participants = validate_bags(schema, pool, bags)?;
        let candidates = prepare_candidates(schema, functions)?;

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.num_threads.unwrap_or(0))
            .build()
            .map_err(|e| ConcunoError::ThreadPool(e.to_string()))?;

        let counts = BagCounts::of_labels(bags.iter().map(|b| &b.label));
        info!(
            "Learning from {} bags ({} positive) with {} candidate functions.",
            bags.len(),
            counts.positive,
            candidates.len()
        );

        let mut tree = Tree::new();
        let splitter = Splitter::new(self.cfg.criterion);
        let mut growable = self.cfg.grow_policy.grower();
        growable.add_node(PendingNode {
            num: 1,
            depth: 0,
            slots: participants,
            population: bags
                .iter()
                .enumerate()
                .map(|(i, bag)| BindingBag::initial(i, bag))
                .collect(),
        });
        while let Some(node) = growable.get_next_node() {
            for kid in self.grow_node(&mut tree, node, schema, pool, bags, &candidates, &splitter, &thread_pool)? {
                growable.add_node(kid);
            }
        }

        let accuracy = thread_pool.install(|| -> Result<f64, ConcunoError> {
            tree.update_leaf_probabilities(pool, bags)?;
            tree.accuracy(pool, bags)
        })?;
        info!(
            "Learned a tree with {} splits and depth {}, training accuracy {:.4}.",
            tree.split_count(),
            tree.depth(),
            accuracy
        );
        Ok(tree)
    }

    /// Split one pending leaf if a good enough split exists, returning the
    /// new leaves to grow.
    #[allow(clippy::too_many_arguments)]
    fn grow_node(
        &self,
        tree: &mut Tree,
        node: PendingNode,
        schema: &Schema,
        pool: &EntityPool,
        bags: &[Bag],
        candidates: &[Candidate],
        splitter: &Splitter,
        thread_pool: &ThreadPool,
    ) -> Result<Vec<PendingNode>, ConcunoError> {
        let counts = BagCounts::of_labels(node.population.iter().map(|b| &b.label));
        let bag_count = node.bag_count();
        if bag_count == 0
            || bag_count < self.cfg.min_bags_split
            || counts.positive == 0
            || counts.negative == 0
            || node.depth >= self.cfg.max_depth
        {
            return Ok(Vec::new());
        }
        let signatures: Vec<FunctionSignature> = candidates.iter().map(|c| c.signature).collect();
        let expansions = enumerate_expansions(&node.slots, &signatures, self.cfg.max_new_vars, self.cfg.max_vars);
        if expansions.is_empty() {
            return Ok(Vec::new());
        }

        // Populations with new variables bound, shared by all expansions
        // adding the same number of variables of the same type.
        let mut rng = StdRng::seed_from_u64(self.cfg.seed ^ node.num as u64);
        let mut cache: HashMap<(usize, TypeId), usize> = HashMap::new();
        let mut population_of = Vec::with_capacity(expansions.len());
        let mut populations = vec![self.cap_population(node.num, node.population, &mut rng)];
        for expansion in &expansions {
            let entity_type = signatures[expansion.function].entity_type;
            if expansion.new_vars == 0 {
                population_of.push(0);
                continue;
            }
            let key = (expansion.new_vars, entity_type);
            if let Some(&index) = cache.get(&key) {
                population_of.push(index);
                continue;
            }
            let mut population = populations[0].clone();
            for _ in 0..expansion.new_vars {
                population = population
                    .iter()
                    .map(|b| b.expand(pool, &bags[b.bag], entity_type))
                    .collect::<Result<_, _>>()?;
                population = self.cap_population(node.num, population, &mut rng);
            }
            cache.insert(key, populations.len());
            population_of.push(populations.len());
            populations.push(population);
        }
        debug!(
            "Node {}: scoring {} expansions over {} bags.",
            node.num,
            expansions.len(),
            bag_count
        );

        let scored: Vec<Option<SplitInfo>> = thread_pool.install(|| {
            expansions
                .par_iter()
                .zip(population_of.par_iter())
                .map(|(expansion, &p)| {
                    let candidate = &candidates[expansion.function];
                    splitter.best_split(
                        pool,
                        &candidate.function,
                        &candidate.signature,
                        &expansion.var_indices,
                        &populations[p],
                    )
                })
                .collect::<Result<Vec<_>, ConcunoError>>()
        })?;

        let mut best: Option<(usize, SplitInfo)> = None;
        for (i, split) in scored.into_iter().enumerate() {
            if let Some(split) = split {
                if best.as_ref().map_or(true, |(_, b)| split.split_gain > b.split_gain) {
                    best = Some((i, split));
                }
            }
        }
        let Some((i, info)) = best.filter(|(_, info)| info.split_gain > self.cfg.min_gain) else {
            return Ok(Vec::new());
        };
        let expansion: &Expansion = &expansions[i];
        let candidate = &candidates[expansion.function];
        let entity_type = candidate.signature.entity_type;
        let population = &populations[population_of[i]];

        let vars: Vec<VarNode> = (0..expansion.new_vars)
            .map(|j| VarNode {
                kid: 0,
                slot: node.slots.len() + j,
                entity_type,
                type_name: schema.ty(entity_type).name.clone(),
            })
            .collect();
        let split = SplitNode {
            function: candidate.function.clone(),
            signature: candidate.signature,
            var_indices: expansion.var_indices.clone(),
            component: info.component,
            threshold: info.threshold,
            gain: info.split_gain,
            yes: 0,
            no: 0,
            err: 0,
        };
        // Bags reaching both branches only grow on the side that claims them.
        let mut parts = Vec::with_capacity(population.len());
        let (mut yes_only, mut no_only, mut both) = (BagCounts::default(), BagCounts::default(), BagCounts::default());
        for bindings in population {
            let [yes, no, _] = split.partition(pool, bindings)?;
            match (yes.is_empty(), no.is_empty()) {
                (false, true) => yes_only.add_label(bindings.label),
                (true, false) => no_only.add_label(bindings.label),
                (false, false) => both.add_label(bindings.label),
                (true, true) => {}
            }
            parts.push((yes, no));
        }
        let shared_to_yes = claim(yes_only, no_only, both, BagCounts::default())[0] == yes_only + both;
        let mut yes_population = Vec::new();
        let mut no_population = Vec::new();
        for (yes, no) in parts {
            let shared = !yes.is_empty() && !no.is_empty();
            if !yes.is_empty() && (!shared || shared_to_yes) {
                yes_population.push(yes);
            }
            if !no.is_empty() && (!shared || !shared_to_yes) {
                no_population.push(no);
            }
        }
        let message = format!(
            "Node {}: split on {}{:?} < {} with gain {:.4}, {} new vars, yes {:?}, no {:?}, err {:?}.",
            node.num,
            candidate.function.name(),
            expansion.var_indices,
            info.threshold,
            info.split_gain,
            expansion.new_vars,
            info.yes,
            info.no,
            info.err
        );
        if self.cfg.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }

        let (yes, no) = tree.split_leaf(node.num, vars, split)?;
        let mut slots = node.slots;
        slots.extend(std::iter::repeat(entity_type).take(expansion.new_vars));
        Ok(vec![
            PendingNode {
                num: yes,
                depth: node.depth + 1,
                slots: slots.clone(),
                population: yes_population,
            },
            PendingNode {
                num: no,
                depth: node.depth + 1,
                slots,
                population: no_population,
            },
        ])
    }

    /// Subsample every bag in proportion when the population holds more
    /// than `max_bindings` bindings. Each bag keeps at least one binding.
    fn cap_population(&self, num: usize, population: Vec<BindingBag>, rng: &mut StdRng) -> Vec<BindingBag> {
        let total: usize = population.iter().map(|b| b.len()).sum();
        if total <= self.cfg.max_bindings {
            return population;
        }
        warn!(
            "Node {}: {} bindings exceed the limit of {}, subsampling.",
            num, total, self.cfg.max_bindings
        );
        let ratio = self.cfg.max_bindings as f64 / total as f64;
        population
            .iter()
            .map(|b| {
                let quota = ((b.len() as f64 * ratio).floor() as usize).max(1);
                b.subsample(quota, rng)
            })
            .collect()
    }
}

/// Check entity handles and participants, returning the participant types.
fn validate_bags(schema: &Schema, pool: &EntityPool, bags: &[Bag]) -> Result<Vec<TypeId>, ConcunoError> {
    for bag in bags {
        for &entity in bag.entities.iter().chain(bag.participants.iter()) {
            let type_id = pool.type_of(entity)?;
            if type_id.index() >= schema.len() {
                return Err(ConcunoError::TypeMismatch(format!(
                    "entity {} has a type unknown to the schema",
                    entity.index()
                )));
            }
        }
    }
    let participant_types = |bag: &Bag| -> Result<Vec<TypeId>, ConcunoError> {
        bag.participants.iter().map(|&e| pool.type_of(e)).collect()
    };
    let first = participant_types(&bags[0])?;
    for bag in &bags[1..] {
        if participant_types(bag)? != first {
            return Err(ConcunoError::TypeMismatch(
                "all bags must have participants of the same types".to_string(),
            ));
        }
    }
    Ok(first)
}

fn prepare_candidates(schema: &Schema, functions: &[Function]) -> Result<Vec<Candidate>, ConcunoError> {
    functions
        .iter()
        .map(|f| {
            for type_id in [f.type_in(), f.type_out()] {
                if type_id.index() >= schema.len() {
                    return Err(ConcunoError::TypeMismatch(format!(
                        "{} was built against another schema",
                        f.name()
                    )));
                }
            }
            for (type_id, property) in f.required_properties() {
                if type_id.index() >= schema.len() {
                    return Err(ConcunoError::TypeMismatch(format!(
                        "{} reads a type unknown to the schema",
                        f.name()
                    )));
                }
                if schema.property(type_id, &property).is_none() {
                    return Err(ConcunoError::MissingProperty(schema.ty(type_id).name.clone(), property));
                }
            }
            let function = f.clone().into_relational(schema)?;
            let signature = function.signature(schema)?;
            Ok(Candidate { function, signature })
        })
        .collect()
}

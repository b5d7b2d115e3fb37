use crate::bag::{Bag, BindingBag};
use crate::constants::LEAF_LABEL_THRESHOLD;
use crate::data::EntityPool;
use crate::errors::ConcunoError;
use crate::node::{Node, NodeKind, SplitNode, VarNode};
use crate::splitter::BagCounts;
use crate::utils::count_log;
use rayon::prelude::*;
use std::fmt::{self, Display};

/// Bags claimed by one leaf when greedily assigning bags to leaves.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafClaim {
    pub num: usize,
    pub counts: BagCounts,
    pub probability: f64,
}

/// A learned tree. Nodes live in an arena indexed by their number, node 0
/// is the root.
#[derive(Clone, Debug)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A root above a single leaf.
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node::root(1), Node::leaf(1, 0, 0, false)],
        }
    }

    pub fn node(&self, num: usize) -> &Node {
        &self.nodes[num]
    }

    /// Replace leaf `leaf` by a chain of var nodes followed by a split,
    /// returning the numbers of the new `yes` and `no` leaves. The kid
    /// numbers inside `vars` and `split` are assigned here.
    pub fn split_leaf(
        &mut self,
        leaf: usize,
        vars: Vec<VarNode>,
        mut split: SplitNode,
    ) -> Result<(usize, usize), ConcunoError> {
        if !self.nodes.get(leaf).is_some_and(|n| n.is_leaf()) {
            return Err(ConcunoError::InvalidParameter(
                "leaf".to_string(),
                "the number of a leaf".to_string(),
                leaf.to_string(),
            ));
        }
        let depth = self.nodes[leaf].depth;
        let mut current = leaf;
        for mut var in vars {
            let kid = self.nodes.len();
            var.kid = kid;
            self.nodes[current].make_parent_node(NodeKind::Var(var));
            self.nodes.push(Node::leaf(kid, depth, current, false));
            current = kid;
        }
        let yes = self.nodes.len();
        split.yes = yes;
        split.no = yes + 1;
        split.err = yes + 2;
        self.nodes[current].make_parent_node(NodeKind::Split(split));
        self.nodes.push(Node::leaf(yes, depth + 1, current, false));
        self.nodes.push(Node::leaf(yes + 1, depth + 1, current, false));
        self.nodes.push(Node::leaf(yes + 2, depth + 1, current, true));
        Ok((yes, yes + 1))
    }

    fn walk(
        &self,
        pool: &EntityPool,
        bag: &Bag,
        num: usize,
        bindings: BindingBag,
        reached: &mut Vec<usize>,
    ) -> Result<(), ConcunoError> {
        match &self.nodes[num].kind {
            NodeKind::Root { kid } => self.walk(pool, bag, *kid, bindings, reached),
            NodeKind::Var(var) => {
                let expanded = bindings.expand(pool, bag, var.entity_type)?;
                self.walk(pool, bag, var.kid, expanded, reached)
            }
            NodeKind::Split(split) => {
                let parts = split.partition(pool, &bindings)?;
                for (part, kid) in parts.into_iter().zip([split.yes, split.no, split.err]) {
                    if !part.is_empty() {
                        self.walk(pool, bag, kid, part, reached)?;
                    }
                }
                Ok(())
            }
            NodeKind::Leaf(_) => {
                reached.push(num);
                Ok(())
            }
        }
    }

    /// Numbers of the leaves reached by any binding of the bag, ascending.
    pub fn reached_leaves(&self, pool: &EntityPool, bag: &Bag) -> Result<Vec<usize>, ConcunoError> {
        let mut reached = Vec::new();
        self.walk(pool, bag, 0, BindingBag::initial(0, bag), &mut reached)?;
        reached.sort_unstable();
        reached.dedup();
        Ok(reached)
    }

    /// True if any binding of the bag reaches a true leaf.
    pub fn classify(&self, pool: &EntityPool, bag: &Bag) -> Result<bool, ConcunoError> {
        Ok(self
            .reached_leaves(pool, bag)?
            .iter()
            .any(|&l| self.nodes[l].as_leaf().is_some_and(|leaf| leaf.label)))
    }

    /// Highest probability among the leaves the bag reaches.
    pub fn predict_probability(&self, pool: &EntityPool, bag: &Bag) -> Result<f64, ConcunoError> {
        Ok(self
            .reached_leaves(pool, bag)?
            .iter()
            .filter_map(|&l| self.nodes[l].as_leaf())
            .map(|leaf| leaf.probability)
            .fold(0.0, f64::max))
    }

    pub fn classify_bags(&self, pool: &EntityPool, bags: &[Bag], parallel: bool) -> Result<Vec<bool>, ConcunoError> {
        if parallel {
            bags.par_iter().map(|bag| self.classify(pool, bag)).collect()
        } else {
            bags.iter().map(|bag| self.classify(pool, bag)).collect()
        }
    }

    /// Fraction of bags whose label is predicted correctly.
    pub fn accuracy(&self, pool: &EntityPool, bags: &[Bag]) -> Result<f64, ConcunoError> {
        if bags.is_empty() {
            return Ok(0.0);
        }
        let predicted = self.classify_bags(pool, bags, true)?;
        let correct = predicted.iter().zip(bags).filter(|(p, b)| **p == b.label).count();
        Ok(correct as f64 / bags.len() as f64)
    }

    /// Greedy assignment of bags to leaves.
    ///
    /// Repeatedly, the leaf with the highest fraction of positives among the
    /// unclaimed bags reaching it claims those bags. Lower numbers win ties.
    /// Error leaves keep probability 0 and take whatever is left.
    pub fn leaf_claims(&self, pool: &EntityPool, bags: &[Bag]) -> Result<Vec<LeafClaim>, ConcunoError> {
        let reached: Vec<Vec<usize>> = bags
            .par_iter()
            .map(|bag| self.reached_leaves(pool, bag))
            .collect::<Result<_, _>>()?;
        let mut leaf_bags: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (b, leaves) in reached.iter().enumerate() {
            for &l in leaves {
                leaf_bags[l].push(b);
            }
        }
        let mut claimed = vec![false; bags.len()];
        let unclaimed_counts = |leaf: usize, claimed: &[bool]| {
            BagCounts::of_labels(
                leaf_bags[leaf]
                    .iter()
                    .filter(|&&b| !claimed[b])
                    .map(|&b| &bags[b].label),
            )
        };

        let mut claims = Vec::new();
        let mut open: Vec<usize> = self
            .leaves()
            .iter()
            .filter(|n| n.as_leaf().is_some_and(|l| !l.is_error))
            .map(|n| n.num)
            .collect();
        loop {
            let mut best: Option<(usize, BagCounts)> = None;
            for (i, &leaf) in open.iter().enumerate() {
                let counts = unclaimed_counts(leaf, &claimed);
                if counts.total() > 0 && best.map_or(true, |(_, c)| counts.fraction() > c.fraction()) {
                    best = Some((i, counts));
                }
            }
            let Some((i, counts)) = best else {
                break;
            };
            let leaf = open.remove(i);
            for &b in &leaf_bags[leaf] {
                claimed[b] = true;
            }
            claims.push(LeafClaim {
                num: leaf,
                counts,
                probability: counts.fraction(),
            });
        }
        for leaf in open {
            claims.push(LeafClaim {
                num: leaf,
                counts: BagCounts::default(),
                probability: 0.0,
            });
        }
        for node in self.leaves() {
            if node.as_leaf().is_some_and(|l| l.is_error) {
                let counts = unclaimed_counts(node.num, &claimed);
                for &b in &leaf_bags[node.num] {
                    claimed[b] = true;
                }
                claims.push(LeafClaim {
                    num: node.num,
                    counts,
                    probability: 0.0,
                });
            }
        }
        claims.sort_by_key(|c| c.num);
        Ok(claims)
    }

    /// Set each leaf's probability, label and counts from `leaf_claims`.
    pub fn update_leaf_probabilities(&mut self, pool: &EntityPool, bags: &[Bag]) -> Result<(), ConcunoError> {
        for claim in self.leaf_claims(pool, bags)? {
            if let Some(leaf) = self.nodes[claim.num].as_leaf_mut() {
                leaf.probability = claim.probability;
                leaf.label = !leaf.is_error && claim.probability > LEAF_LABEL_THRESHOLD;
                leaf.positive = claim.counts.positive;
                leaf.negative = claim.counts.negative;
            }
        }
        Ok(())
    }

    /// Log likelihood of the bag labels under the claimed leaf probabilities,
    /// `sum(pos ln p + neg ln (1 - p))`.
    pub fn log_metric(&self, pool: &EntityPool, bags: &[Bag]) -> Result<f64, ConcunoError> {
        Ok(self
            .leaf_claims(pool, bags)?
            .iter()
            .map(|c| count_log(c.counts.positive, c.probability) + count_log(c.counts.negative, 1.0 - c.probability))
            .sum())
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_leaf()).collect()
    }

    pub fn split_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Split(_)))
            .count()
    }

    /// Largest number of splits on a path from the root to a leaf.
    pub fn depth(&self) -> usize {
        self.leaves().iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

impl Display for Tree {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<(usize, usize)> = vec![(0, 0)];
        let mut r = String::new();
        while let Some((idx, level)) = print_buffer.pop() {
            let node = &self.nodes[idx];
            r += format!("{}{}\n", "      ".repeat(level).as_str(), node).as_str();
            for kid in node.kids().into_iter().rev() {
                print_buffer.push((kid, level + 1));
            }
        }
        write!(f, "{}", r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{encode_scalars, Entity};
    use crate::function::{Function, GetFunction};
    use crate::schema::{Schema, TypeId};

    struct Fixture {
        pool: EntityPool,
        tree: Tree,
        bags: Vec<Bag>,
    }

    fn var(schema: &Schema, item: TypeId, slot: usize) -> VarNode {
        VarNode {
            kid: 0,
            slot,
            entity_type: item,
            type_name: schema.ty(item).name.clone(),
        }
    }

    /// One var and one split `x(x0) < 3` over bags holding the given x values.
    fn fixture(bags: &[(bool, Vec<f64>)]) -> Fixture {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let item = schema.add_type("Item", 0).unwrap();
        schema.push_or_expand_property(item, "x", float).unwrap();
        let get: Function = GetFunction::new(&mut schema, item, "x").unwrap().into();
        let function = get.into_relational(&schema).unwrap();
        let signature = function.signature(&schema).unwrap();
        let mut pool = EntityPool::new();
        let bags: Vec<Bag> = bags
            .iter()
            .map(|(label, xs)| {
                let entities: Vec<Entity> = xs
                    .iter()
                    .map(|x| pool.push(&schema, item, &encode_scalars(&[*x])).unwrap())
                    .collect();
                Bag::new(*label, entities)
            })
            .collect();
        let mut tree = Tree::new();
        let split = SplitNode {
            function,
            signature,
            var_indices: vec![0],
            component: 0,
            threshold: 3.0,
            gain: 0.5,
            yes: 0,
            no: 0,
            err: 0,
        };
        tree.split_leaf(1, vec![var(&schema, item, 0)], split).unwrap();
        Fixture { pool, tree, bags }
    }

    #[test]
    fn test_split_leaf_layout() {
        let f = fixture(&[]);
        assert_eq!(f.tree.nodes.len(), 6);
        assert!(matches!(f.tree.node(1).kind, NodeKind::Var(_)));
        assert!(matches!(f.tree.node(2).kind, NodeKind::Split(_)));
        assert_eq!(f.tree.node(2).parent, Some(1));
        assert_eq!(f.tree.node(2).kids(), vec![3, 4, 5]);
        assert_eq!(f.tree.depth(), 1);
        assert_eq!(f.tree.split_count(), 1);
        assert_eq!(f.tree.leaves().len(), 3);
        let mut tree = f.tree.clone();
        let split = match &tree.node(2).kind {
            NodeKind::Split(s) => s.clone(),
            _ => unreachable!(),
        };
        assert!(tree.split_leaf(2, Vec::new(), split).is_err());
    }

    #[test]
    fn test_leaf_probabilities() {
        let mut f = fixture(&[
            (true, vec![5.0]),
            (false, vec![1.0]),
            (true, vec![1.0, 6.0]),
            (false, vec![2.0]),
            (false, vec![]),
        ]);
        f.tree.update_leaf_probabilities(&f.pool, &f.bags).unwrap();
        let no = f.tree.node(4).as_leaf().unwrap();
        assert_eq!((no.positive, no.negative), (2, 0));
        assert_eq!(no.probability, 1.0);
        assert!(no.label);
        // The mixed bag was claimed by the no leaf first.
        let yes = f.tree.node(3).as_leaf().unwrap();
        assert_eq!((yes.positive, yes.negative), (0, 2));
        assert!(!yes.label);
        let err = f.tree.node(5).as_leaf().unwrap();
        assert_eq!((err.positive, err.negative), (0, 1));
        assert!(!err.label);

        assert_eq!(
            f.tree.classify_bags(&f.pool, &f.bags, false).unwrap(),
            vec![true, false, true, false, false]
        );
        assert_eq!(
            f.tree.classify_bags(&f.pool, &f.bags, true).unwrap(),
            f.tree.classify_bags(&f.pool, &f.bags, false).unwrap()
        );
        assert_eq!(f.tree.accuracy(&f.pool, &f.bags).unwrap(), 1.0);
        assert_eq!(f.tree.predict_probability(&f.pool, &f.bags[2]).unwrap(), 1.0);
        assert_eq!(f.tree.predict_probability(&f.pool, &f.bags[4]).unwrap(), 0.0);
        assert_eq!(f.tree.reached_leaves(&f.pool, &f.bags[2]).unwrap(), vec![3, 4]);
        assert_eq!(f.tree.log_metric(&f.pool, &f.bags).unwrap(), 0.0);
    }

    #[test]
    fn test_log_metric_mixed_leaf() {
        let f = fixture(&[(true, vec![5.0]), (false, vec![6.0]), (false, vec![1.0])]);
        let metric = f.tree.log_metric(&f.pool, &f.bags).unwrap();
        let expected = 0.5_f64.ln() * 2.0;
        assert!((metric - expected).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        let mut f = fixture(&[(true, vec![5.0]), (false, vec![1.0])]);
        f.tree.update_leaf_probabilities(&f.pool, &f.bags).unwrap();
        let dump = format!("{}", f.tree);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(
            lines,
            vec![
                "0:root kid=1",
                "      1:var x0:Item",
                "            2:[x(x0) < 3] yes=3,no=4,err=5,gain=0.5",
                "                  3:leaf=false,prob=0,pos=0,neg=1",
                "                  4:leaf=true,prob=1,pos=1,neg=0",
                "                  5:err leaf=false",
            ]
        );
    }
}

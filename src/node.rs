use crate::bag::BindingBag;
use crate::data::{Entity, EntityPool};
use crate::errors::ConcunoError;
use crate::function::{Function, FunctionOps, FunctionSignature};
use crate::schema::TypeId;
use std::fmt;

/// Which kid of a split a binding goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
    /// Value below the threshold.
    Yes,
    No,
    /// An argument is unbound or the value is NaN.
    Err,
}

/// Introduces one variable slot, bound to each entity of `entity_type` in the bag.
#[derive(Clone, Debug)]
pub struct VarNode {
    pub kid: usize,
    pub slot: usize,
    pub entity_type: TypeId,
    pub type_name: String,
}

/// Threshold test on one output component of a function over bound variables.
#[derive(Clone, Debug)]
pub struct SplitNode {
    pub function: Function,
    pub signature: FunctionSignature,
    pub var_indices: Vec<usize>,
    pub component: usize,
    pub threshold: f64,
    pub gain: f64,
    pub yes: usize,
    pub no: usize,
    pub err: usize,
}

impl SplitNode {
    pub fn route(&self, pool: &EntityPool, binding: &[Option<Entity>]) -> Result<Branch, ConcunoError> {
        match self
            .function
            .evaluate_binding(pool, &self.signature, binding, &self.var_indices)?
        {
            None => Ok(Branch::Err),
            Some(values) if values[self.component] < self.threshold => Ok(Branch::Yes),
            Some(_) => Ok(Branch::No),
        }
    }

    /// Split one bag's bindings into yes, no and err populations.
    pub fn partition(&self, pool: &EntityPool, bindings: &BindingBag) -> Result<[BindingBag; 3], ConcunoError> {
        let mut parts = [bindings.empty_like(), bindings.empty_like(), bindings.empty_like()];
        for binding in bindings.bindings() {
            let i = match self.route(pool, binding)? {
                Branch::Yes => 0,
                Branch::No => 1,
                Branch::Err => 2,
            };
            parts[i].push(binding);
        }
        Ok(parts)
    }

    pub fn kid(&self, branch: Branch) -> usize {
        match branch {
            Branch::Yes => self.yes,
            Branch::No => self.no,
            Branch::Err => self.err,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
    pub label: bool,
    pub probability: f64,
    /// Positive bags claimed by this leaf.
    pub positive: usize,
    /// Negative bags claimed by this leaf.
    pub negative: usize,
    /// Kid for failed evaluations, always predicts false.
    pub is_error: bool,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Root { kid: usize },
    Var(VarNode),
    Split(SplitNode),
    Leaf(LeafNode),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub num: usize,
    /// Number of splits above this node.
    pub depth: usize,
    pub parent: Option<usize>,
    pub kind: NodeKind,
}

impl Node {
    pub fn root(kid: usize) -> Self {
        Node {
            num: 0,
            depth: 0,
            parent: None,
            kind: NodeKind::Root { kid },
        }
    }

    pub fn leaf(num: usize, depth: usize, parent: usize, is_error: bool) -> Self {
        Node {
            num,
            depth,
            parent: Some(parent),
            kind: NodeKind::Leaf(LeafNode {
                label: false,
                probability: 0.0,
                positive: 0,
                negative: 0,
                is_error,
            }),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Kids in display order.
    pub fn kids(&self) -> Vec<usize> {
        match &self.kind {
            NodeKind::Root { kid } => vec![*kid],
            NodeKind::Var(var) => vec![var.kid],
            NodeKind::Split(split) => vec![split.yes, split.no, split.err],
            NodeKind::Leaf(_) => Vec::new(),
        }
    }

    /// Turn this leaf into an inner node, keeping its number and parent.
    pub fn make_parent_node(&mut self, kind: NodeKind) {
        self.kind = kind;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            NodeKind::Root { kid } => write!(f, "{}:root kid={}", self.num, kid),
            NodeKind::Var(var) => write!(f, "{}:var x{}:{}", self.num, var.slot, var.type_name),
            NodeKind::Split(split) => {
                let args = split
                    .var_indices
                    .iter()
                    .map(|v| format!("x{}", v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let component = if split.signature.components > 1 {
                    format!("[{}]", split.component)
                } else {
                    String::new()
                };
                write!(
                    f,
                    "{}:[{}{}({}) < {}] yes={},no={},err={},gain={}",
                    self.num,
                    split.function.name(),
                    component,
                    args,
                    split.threshold,
                    split.yes,
                    split.no,
                    split.err,
                    split.gain
                )
            }
            NodeKind::Leaf(leaf) if leaf.is_error => write!(f, "{}:err leaf={}", self.num, leaf.label),
            NodeKind::Leaf(leaf) => write!(
                f,
                "{}:leaf={},prob={},pos={},neg={}",
                self.num, leaf.label, leaf.probability, leaf.positive, leaf.negative
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::Bag;
    use crate::data::encode_scalars;
    use crate::function::GetFunction;
    use crate::schema::Schema;

    fn split_on_x(threshold: f64) -> (Schema, EntityPool, SplitNode, Vec<Entity>) {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let item = schema.add_type("Item", 0).unwrap();
        schema.push_or_expand_property(item, "x", float).unwrap();
        let get: Function = GetFunction::new(&mut schema, item, "x").unwrap().into();
        let function = get.into_relational(&schema).unwrap();
        let signature = function.signature(&schema).unwrap();
        let mut pool = EntityPool::new();
        let entities: Vec<Entity> = [1.0_f64, 5.0, f64::NAN]
            .iter()
            .map(|x| pool.push(&schema, item, &encode_scalars(&[*x])).unwrap())
            .collect();
        let split = SplitNode {
            function,
            signature,
            var_indices: vec![0],
            component: 0,
            threshold,
            gain: 0.5,
            yes: 3,
            no: 4,
            err: 5,
        };
        (schema, pool, split, entities)
    }

    #[test]
    fn test_route() {
        let (_, pool, split, e) = split_on_x(3.0);
        assert_eq!(split.route(&pool, &[Some(e[0])]).unwrap(), Branch::Yes);
        assert_eq!(split.route(&pool, &[Some(e[1])]).unwrap(), Branch::No);
        assert_eq!(split.route(&pool, &[Some(e[2])]).unwrap(), Branch::Err);
        assert_eq!(split.route(&pool, &[None]).unwrap(), Branch::Err);
        assert_eq!(split.kid(Branch::Err), 5);
    }

    #[test]
    fn test_partition() {
        let (schema, pool, split, e) = split_on_x(3.0);
        let item = schema.find_type("Item").unwrap();
        let bag = Bag::new(true, e.clone());
        let population = BindingBag::initial(0, &bag).expand(&pool, &bag, item).unwrap();
        let [yes, no, err] = split.partition(&pool, &population).unwrap();
        assert_eq!(yes.len(), 1);
        assert_eq!(no.len(), 1);
        assert_eq!(err.len(), 1);
        assert_eq!(no.binding(0), &[Some(e[1])]);
    }

    #[test]
    fn test_display() {
        let (_, _, split, _) = split_on_x(3.0);
        let node = Node {
            num: 2,
            depth: 0,
            parent: Some(1),
            kind: NodeKind::Split(split),
        };
        assert_eq!(format!("{}", node), "2:[x(x0) < 3] yes=3,no=4,err=5,gain=0.5");
        let mut leaf = Node::leaf(3, 1, 2, false);
        if let Some(l) = leaf.as_leaf_mut() {
            l.label = true;
            l.probability = 1.0;
            l.positive = 2;
        }
        assert_eq!(format!("{}", leaf), "3:leaf=true,prob=1,pos=2,neg=0");
        assert_eq!(format!("{}", Node::leaf(5, 1, 2, true)), "5:err leaf=false");
    }
}

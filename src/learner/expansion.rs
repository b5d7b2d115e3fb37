use crate::function::FunctionSignature;
use crate::schema::TypeId;

/// One way to grow a leaf: bind `new_vars` fresh variables of the function's
/// entity type, then split on the function applied to `var_indices`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expansion {
    /// Index into the candidate functions.
    pub function: usize,
    pub new_vars: usize,
    pub var_indices: Vec<usize>,
}

/// All expansions of a leaf whose path already binds variables of the types
/// in `slots`, in canonical order: by number of new variables, then function,
/// then argument assignment.
///
/// Every new variable must be used, and new variables appear in the
/// arguments in the order they are created. For binary functions, the
/// reverse of an assignment already listed is skipped.
pub fn enumerate_expansions(
    slots: &[TypeId],
    signatures: &[FunctionSignature],
    max_new_vars: usize,
    max_vars: usize,
) -> Vec<Expansion> {
    let mut expansions = Vec::new();
    for new_vars in 0..=max_new_vars {
        if slots.len() + new_vars > max_vars {
            break;
        }
        for (function, signature) in signatures.iter().enumerate() {
            if new_vars > signature.arity {
                continue;
            }
            let first = expansions.len();
            let mut assignment = Vec::with_capacity(signature.arity);
            recurse(
                slots,
                signature,
                new_vars,
                &mut assignment,
                &mut |var_indices: &[usize]| {
                    let reversed = var_indices.len() == 2
                        && expansions[first..].iter().any(|e: &Expansion| {
                            e.var_indices[0] == var_indices[1] && e.var_indices[1] == var_indices[0]
                        });
                    if !reversed {
                        expansions.push(Expansion {
                            function,
                            new_vars,
                            var_indices: var_indices.to_vec(),
                        });
                    }
                },
            );
        }
    }
    expansions
}

fn recurse(
    slots: &[TypeId],
    signature: &FunctionSignature,
    new_vars: usize,
    assignment: &mut Vec<usize>,
    emit: &mut dyn FnMut(&[usize]),
) {
    let next_new = slots.len() + assignment.iter().filter(|&&v| v >= slots.len()).count();
    let remaining = signature.arity - assignment.len();
    let unused_new = slots.len() + new_vars - next_new;
    if remaining == 0 {
        if unused_new == 0 {
            emit(assignment);
        }
        return;
    }
    // Existing slots, only while enough positions remain for the new ones.
    if remaining > unused_new {
        for (var, &slot_type) in slots.iter().enumerate() {
            if slot_type == signature.entity_type && !assignment.contains(&var) {
                assignment.push(var);
                recurse(slots, signature, new_vars, assignment, emit);
                assignment.pop();
            }
        }
    }
    if unused_new > 0 {
        assignment.push(next_new);
        recurse(slots, signature, new_vars, assignment, emit);
        assignment.pop();
    }
}

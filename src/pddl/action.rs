use crate::pddl::{Cond, Name, Params};

/// A lifted action. After normalisation `pre` is a conjunction of atoms (or
/// a disjunction of such conjunctions before splitting) and `eff` is a
/// conjunction of atoms, cost increases and conditional effects.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: Name,
    /// Declared parameters first, then variables introduced by quantifiers
    /// (marked with `inherit`). Quantifier variables are substituted away by
    /// normalisation and dropped afterwards.
    pub params: Params,
    /// Number of declared parameters; the grounder instantiates exactly
    /// these.
    pub declared_params: usize,
    pub pre: Cond,
    pub eff: Cond,
}

impl Action {
    pub fn new(name: Name, params: Params, pre: Cond, eff: Cond) -> Self {
        let declared_params = params.len();
        Self {
            name,
            params,
            declared_params,
            pre,
            eff,
        }
    }

    /// Drops quantifier-introduced parameters once normalisation has
    /// substituted them away.
    pub(crate) fn truncate_quantifier_params(&mut self) {
        debug_assert!({
            let mut ok = true;
            let limit = self.declared_params;
            let mut check = |a: &crate::pddl::CondAtom| {
                for arg in &a.args {
                    if let Some(p) = arg.param() {
                        ok = ok && p < limit;
                    }
                }
            };
            self.pre.visit_atoms(&mut check);
            self.eff.visit_atoms(&mut check);
            ok
        });
        self.params.truncate(self.declared_params);
    }
}

use escflow_ir::{NodeId, Op};

use super::{EscState, LabelState};
use crate::error::EscapeError;

enum Visit {
    Enter(NodeId),
    Node(NodeId),
}

impl EscState<'_> {
    /// Marks the labels that are the target of a backward `goto`. Only
    /// those start a loop; a label reached by forward jumps only does not
    /// deepen the loop depth.
    pub(super) fn escloopdepth_list(&mut self, stmts: &[NodeId]) -> Result<(), EscapeError> {
        let mut stack: Vec<Visit> = stmts.iter().rev().map(|&n| Visit::Enter(n)).collect();
        let mut children = Vec::new();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(n) => {
                    let data = &self.prog.nodes[n];
                    children.clear();
                    children.extend(data.left.expand());
                    children.extend(data.right.expand());
                    children.extend(data.list.iter().copied());
                    children.extend(data.ntest.expand());
                    children.extend(data.nincr.expand());
                    children.extend(data.nbody.iter().copied());
                    children.extend(data.nelse.iter().copied());
                    children.extend(data.rlist.iter().copied());

                    stack.extend(children.iter().rev().map(|&child| Visit::Enter(child)));
                    stack.push(Visit::Node(n));
                    stack.extend(data.ninit.iter().rev().map(|&init| Visit::Enter(init)));
                }

                Visit::Node(n) => self.escloopdepth_node(n)?,
            }
        }

        Ok(())
    }

    fn escloopdepth_node(&mut self, n: NodeId) -> Result<(), EscapeError> {
        let data = &self.prog.nodes[n];
        match data.op {
            Op::Label => {
                let label = data
                    .label
                    .expand()
                    .ok_or(EscapeError::LabelWithoutSymbol { node: n })?;
                self.labels.insert(label, LabelState::NonLooping);
            }

            Op::Goto => {
                let label = data
                    .label
                    .expand()
                    .ok_or(EscapeError::LabelWithoutSymbol { node: n })?;
                // A label seen before the goto is jumped to backward. An
                // unseen one is a harmless forward jump.
                if let Some(state) = self.labels.get_mut(&label) {
                    if *state == LabelState::NonLooping {
                        *state = LabelState::Looping;
                    }
                }
            }

            _ => {}
        }

        Ok(())
    }
}

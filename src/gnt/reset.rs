use log::trace;

use super::Gnt;
use crate::error::{GntErr, Result};
use crate::optimization::Optimizer;

impl Gnt {
    /// Zeroes the optimizer's moment and step entries for regenerated units
    /// so they do not inherit stale momentum: the incoming weight rows and
    /// bias entries of each selected unit, and its outgoing weight columns in
    /// the downstream layer.
    ///
    /// A no-op for optimizers without moment state. Must run after
    /// [`regenerate`](Self::regenerate) on the same selection.
    ///
    /// # Arguments
    /// * `opt` - The optimizer used by the surrounding training loop.
    /// * `selected` - Unit indices per hidden layer.
    /// * `counts` - Number of selected units per hidden layer.
    pub fn reset_optimizer<O: Optimizer>(
        &self,
        opt: &mut O,
        selected: &[Vec<usize>],
        counts: &[usize],
    ) -> Result<()> {
        let Some(moments) = opt.moment_state_mut() else {
            return Ok(());
        };

        if selected.len() != self.num_hidden_layers || counts.len() != self.num_hidden_layers {
            return Err(GntErr::ShapeMismatch {
                what: "selection",
                got: selected.len(),
                expected: self.num_hidden_layers,
            });
        }
        if moments.len() != self.num_hidden_layers + 1 {
            return Err(GntErr::ShapeMismatch {
                what: "moment state",
                got: moments.len(),
                expected: self.num_hidden_layers + 1,
            });
        }

        for i in 0..self.num_hidden_layers {
            if counts[i] == 0 {
                continue;
            }
            let (head, tail) = moments.split_at_mut(i + 1);
            let current = &mut head[i];
            let next = &mut tail[0];

            for &u in &selected[i] {
                current.exp_avg_w.row_mut(u).fill(0.);
                current.exp_avg_sq_w.row_mut(u).fill(0.);
                current.step_w.row_mut(u).fill(0.);
                current.exp_avg_b[u] = 0.;
                current.exp_avg_sq_b[u] = 0.;
                current.step_b[u] = 0.;

                next.exp_avg_w.column_mut(u).fill(0.);
                next.exp_avg_sq_w.column_mut(u).fill(0.);
                next.step_w.column_mut(u).fill(0.);
            }
            trace!("cleared optimizer state for {} unit(s) in layer {i}", counts[i]);
        }

        Ok(())
    }
}

//! Current and previous tendencies of one prognostic field.

use swell_core::Field;

/// The pair `(Gⁿ, G⁻)` consumed by the AB2 update.
///
/// Both buffers share the layout of their prognostic field. Rotation is
/// a buffer swap: after [`rotate`](Self::rotate) the old `Gⁿ` is `G⁻`,
/// and the new `Gⁿ` holds stale values until it is recomputed.
#[derive(Clone, Debug)]
pub struct TendencyState {
    current: Field,
    previous: Field,
}

impl TendencyState {
    /// Zeroed tendencies shaped like `field`.
    pub fn for_field(field: &Field) -> Self {
        Self {
            current: field.zeros_like(format!("G_{}", field.name())),
            previous: field.zeros_like(format!("G⁻_{}", field.name())),
        }
    }

    /// `G⁻ ← Gⁿ`.
    pub fn rotate(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }

    /// Undo a [`rotate`](Self::rotate) whose recomputation failed.
    pub(crate) fn unrotate(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }

    /// `Gⁿ`.
    pub fn current(&self) -> &Field {
        &self.current
    }

    /// Mutable `Gⁿ`, for kernels to write into.
    pub fn current_mut(&mut self) -> &mut Field {
        &mut self.current
    }

    /// `G⁻`.
    pub fn previous(&self) -> &Field {
        &self.previous
    }
}

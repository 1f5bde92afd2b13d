use sn_tensor::{Device, Retain, Tensor};

use crate::variables::{VariableLoader, VariableStore};

/// Trait for fixed-topology networks run through a [`Device`].
///
/// Implementations hold the network description and, once loaded, its
/// variables. Inference is stateless between calls: every call runs in its
/// own top-level scope and hands back only the values in `Output`, which the
/// caller owns and eventually disposes.
pub trait ModelArchitecture: Send + Sync {
    /// What a forward pass hands back to the caller.
    type Output: Retain;

    fn name(&self) -> &str;

    /// Replaces the variables with everything `loader` resolves.
    fn load_variables(&mut self, loader: &dyn VariableLoader) -> crate::Result<()>;

    /// The loaded variables, if any.
    fn variables(&self) -> Option<&VariableStore>;

    /// Runs the forward pass over a preprocessed input.
    ///
    /// Fails with a missing-variable fault when the variables have not been
    /// loaded; no device work is issued for a layer whose variables are absent.
    fn infer(&self, dev: &mut Device, input: &Tensor) -> crate::Result<Self::Output>;
}

use std::sync::Arc;

/// Type alias for a JIT-compiled function that evaluates several expressions at once.
///
/// This represents a function that:
/// - Takes a slice of input values, one per variable in layout order
/// - Takes a mutable slice to store the results, one per expression
/// - Is both Send and Sync so a compiled system can be shared
pub type CombinedJITFunction = Arc<dyn Fn(&[f64], &mut [f64]) + Send + Sync>;

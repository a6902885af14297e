// ABOUTME: Sealed trait pattern for backend traits.
// ABOUTME: Only the backends in this crate can implement FleetOps and RoutingOps.

/// Sealed trait to prevent external implementations.
///
/// New methods can be added to the backend traits without breaking
/// downstream code.
pub trait Sealed {}

mod breaker;

pub use breaker::{CircuitBreaker, CircuitState};

pub mod circuit_breakers;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod routes;


mod membership;
mod properties;
mod sampling;
mod snapshot;

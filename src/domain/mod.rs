// Domain layer: dataflow spec models, embedded metadata and ports. No I/O here.

pub mod metadata;
pub mod model;
pub mod ports;

mod cassandra_datacenter;

pub use cassandra_datacenter::*;

/// A unit of write submitted to the commit log.
///
/// The allocator only needs to know which keyspace a mutation targets and
/// whether that keyspace's CDC flag covers the local datacenter. Deriving
/// the flag (keyspace options, datacenter intersection) is the host's
/// concern.
pub trait Mutation {
    /// Name of the keyspace this mutation targets.
    fn keyspace(&self) -> &str;

    /// `true` if this mutation's keyspace is tracked by CDC on the local
    /// datacenter.
    fn cdc_tracked(&self) -> bool;
}

/// An allotted region of a segment, promising space the caller will fill.
///
/// There is no cancellation: once handed out, the region is the caller's
/// obligation to fill or waste.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reservation {
    /// Id of the segment the space was reserved in.
    pub segment_id: u64,
    /// Byte offset of the start of the reserved region within the segment.
    pub offset: u64,
    /// Length of the reserved region in bytes.
    pub len: u64,
}

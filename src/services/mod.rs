pub mod checksum_relay;
pub mod document_store;
pub mod feed_assembler;
pub mod identity_registry;
pub mod media_service;
pub mod object_store;
pub mod post_aggregate;

#[cfg(test)]
pub mod test_support;

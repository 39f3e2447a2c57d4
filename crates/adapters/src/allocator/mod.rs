pub mod shared_allocator;

pub use shared_allocator::SharedPortAllocator;

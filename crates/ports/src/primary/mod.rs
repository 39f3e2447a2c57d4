pub mod portmap_service;

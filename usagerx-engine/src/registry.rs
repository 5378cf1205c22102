//! ## usagerx-engine::registry
//! Ordered handler list; a packet goes to the first handler whose codes match
//! its header.

use tracing::{debug, warn};

use usagerx_config::TableConfig;
use usagerx_protocols::{
    Gram5JobHandler, Gram5JobManagerHandler, GridFtpTransferHandler, PacketHandler, PacketHeader,
};

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn PacketHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in handlers, writing to the configured tables.
    pub fn with_defaults(tables: &TableConfig) -> Self {
        let mut registry = Self::new();
        registry.register(GridFtpTransferHandler::new(tables.gridftp_transfer.as_str()));
        registry.register(Gram5JobManagerHandler::new(tables.gram5_job_manager.as_str()));
        registry.register(Gram5JobHandler::new(tables.gram5_job.as_str()));
        registry
    }

    /// Appends `handler`. A handler whose codes are already owned is kept but
    /// never selected.
    pub fn register(&mut self, handler: impl PacketHandler + 'static) {
        self.register_boxed(Box::new(handler));
    }

    pub fn register_boxed(&mut self, handler: Box<dyn PacketHandler>) {
        let codes = handler.codes();
        if let Some(owner) = self.resolve(codes) {
            warn!(
                handler = handler.name(),
                owner = owner.name(),
                %codes,
                "Handler shadowed by earlier registration"
            );
        } else {
            debug!(handler = handler.name(), %codes, table = handler.table(), "Registered handler");
        }
        self.handlers.push(handler);
    }

    /// First registered handler matching `header`.
    pub fn resolve(&self, header: PacketHeader) -> Option<&dyn PacketHandler> {
        self.handlers
            .iter()
            .find(|h| h.matches(header.component_code, header.version_code))
            .map(|h| h.as_ref())
    }

    pub fn handlers(&self) -> impl Iterator<Item = &dyn PacketHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagerx_core::RawPacket;
    use usagerx_protocols::{ColumnSpec, DecodedPacket, HandlerError, PersistenceCommand};

    struct Fixed {
        name: &'static str,
        codes: PacketHeader,
    }

    impl PacketHandler for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn codes(&self) -> PacketHeader {
            self.codes
        }
        fn table(&self) -> &str {
            "t"
        }
        fn columns(&self) -> &'static [ColumnSpec] {
            &[]
        }
        fn decode(&self, _: &RawPacket) -> Result<DecodedPacket, HandlerError> {
            unimplemented!()
        }
        fn build_persistence_command(
            &self,
            _: &DecodedPacket,
        ) -> Result<PersistenceCommand, HandlerError> {
            unimplemented!()
        }
    }

    #[test]
    fn defaults_route_by_exact_codes() {
        let registry = HandlerRegistry::with_defaults(&TableConfig::default());
        assert_eq!(registry.len(), 3);

        let gftp = registry.resolve(PacketHeader::new(0, 0)).unwrap();
        assert_eq!(gftp.name(), "gridftp_transfer");
        assert_eq!(gftp.table(), "gftp_transfers");
        assert_eq!(
            registry.resolve(PacketHeader::new(20, 0)).unwrap().table(),
            "gram5_job_manager_status"
        );
        let job = registry.resolve(PacketHeader::new(20, 1)).unwrap();
        assert_eq!(job.name(), "gram5_job");
        assert_eq!(job.table(), "gram5_job_status");
        assert!(registry.resolve(PacketHeader::new(7, 3)).is_none());
        assert!(registry.resolve(PacketHeader::new(0, 1)).is_none());
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        registry.register(Fixed {
            name: "first",
            codes: PacketHeader::new(5, 1),
        });
        registry.register(Fixed {
            name: "second",
            codes: PacketHeader::new(5, 1),
        });

        for _ in 0..10 {
            assert_eq!(
                registry.resolve(PacketHeader::new(5, 1)).unwrap().name(),
                "first"
            );
        }
        let names: Vec<_> = registry.handlers().map(|h| h.name()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn empty_registry_routes_nothing() {
        assert!(HandlerRegistry::new()
            .resolve(PacketHeader::new(0, 0))
            .is_none());
    }
}

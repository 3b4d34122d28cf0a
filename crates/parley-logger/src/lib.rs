// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod factory;
pub mod gateway;
pub mod reader;
pub mod transport;

pub use factory::{
    create_logger, logger_with_callback, LoggerPreset, MigrationConfig, ProductionConfig,
    PRODUCTION_ENDPOINT_VAR,
};
pub use gateway::EventSessionLogger;
pub use reader::{
    last_record, list_sessions, load_or_rebuild_metadata, read_records, EventRecord,
    SessionMetadata, METADATA_FILE,
};
pub use transport::{
    CallbackTransport, ConnectionState, FailingTransport, FileTransport, HttpTransport,
    LogTransport, MultiTransport, NullTransport, QueueTransport, RetryTransport, Transport,
    TransportCore, TransportMetrics,
};

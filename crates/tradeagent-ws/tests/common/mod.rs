//! Shared helpers for tradeagent-ws integration tests.

pub mod mock_ws;

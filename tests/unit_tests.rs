//! Entry point for the per-module unit tests under `tests/unit/`.

mod unit;

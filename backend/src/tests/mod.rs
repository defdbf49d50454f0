//! Database-backed API tests. They run only when `TEST_DATABASE_URL` points
//! at a disposable Postgres instance; without it each test skips itself.

mod contracts_api;
mod support;

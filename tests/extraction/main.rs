mod exports;
mod helpers;
mod schema_fetch;

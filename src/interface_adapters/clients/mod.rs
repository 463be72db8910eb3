// Clients for collaborating services.

pub mod ledger;

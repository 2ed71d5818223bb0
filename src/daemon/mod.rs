//! Process-level shutdown coordination (component G).

pub mod signals;

#![forbid(unsafe_code)]

//! tether public facade crate.
//!
//! Observable objects ([`tether_core`]) and computed properties on top of
//! them ([`tether_calc`]). Most programs only need the prelude:
//!
//! ```
//! use tether::prelude::*;
//!
//! let cart = Object::new().with("items", 2).with("price", 5);
//! cart.calc(
//!     "total",
//!     ["items", "price"],
//!     |v| Value::from(v[0].as_i64().unwrap_or(0) * v[1].as_i64().unwrap_or(0)),
//!     CalcOptions::new(),
//! )
//! .unwrap();
//! assert_eq!(cart.get("total"), Value::Int(10));
//! ```

pub use tether_calc as calc;
pub use tether_core as core;

pub mod prelude {
    pub use tether_calc::{
        Binding, CalcError, CalcExt, CalcOptions, LabClock, RunLoop, RunLoopConfig, SourceSpec,
        bindings, try_calc, uncalc,
    };
    pub use tether_core::{
        Cascade, Error, Event, Fields, Object, SetOptions, Subscription, Value, WeakObject,
        change_event,
    };
}

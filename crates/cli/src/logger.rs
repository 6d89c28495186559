//! Progress output goes to stderr so that rendered documents on stdout
//! stay pipeable.

use std::fmt::Display;

pub fn action(msg: impl Display) {
    eprintln!("► {msg}");
}

pub fn success(msg: impl Display) {
    eprintln!("✔ {msg}");
}

pub fn failure(msg: impl Display) {
    eprintln!("✗ {msg}");
}

pub fn waiting(msg: impl Display) {
    eprintln!("◎ {msg}");
}

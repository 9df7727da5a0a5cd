use std::ffi::CString;

use indexmap::IndexMap;
use log::debug;

/// Insertion-ordered `NAME=VALUE` store, unique by name.
///
/// Backed by `IndexMap` rather than the teacher's `HashMap`-keyed job table —
/// `print()` and `export()` both need insertion order, which a plain hash map
/// doesn't give for free.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    vars: IndexMap<String, String>,
}

impl Environment {
    /// Populate from the process's inherited environment, then ensure `PS1`
    /// and `SUSHHOME` exist.
    pub fn init() -> Self {
        let mut env = Environment::default();
        for (name, value) in std::env::vars() {
            env.vars.insert(name, value);
        }

        if !env.exists("PS1") {
            env.set("PS1", "$ ");
        }
        if !env.exists("SUSHHOME") {
            let pwd = env.get("PWD").cloned().unwrap_or_else(|| ".".to_string());
            env.set("SUSHHOME", &pwd);
        }

        debug!("environment initialized with {} entries", env.vars.len());
        env
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.shift_remove(name);
    }

    /// One `NAME=VALUE` per line, in insertion order.
    pub fn print(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        for (name, value) in &self.vars {
            writeln!(out, "{name}={value}")?;
        }
        Ok(())
    }

    /// Update `PWD` to the current working directory after a `cd`.
    pub fn sync_pwd(&mut self) {
        if let Ok(cwd) = std::env::current_dir() {
            self.set("PWD", &cwd.to_string_lossy());
        }
    }

    /// Export as nil-terminated `NAME=VALUE` C strings, suitable for the
    /// `execvpe`-style launch the execution engine performs on fork.
    pub fn export(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(name, value)| CString::new(format!("{name}={value}")).ok())
            .collect()
    }
}

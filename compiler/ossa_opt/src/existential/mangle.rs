//! Specialization names.
//!
//! `<original>Tf<codes>_`, one code per parameter: `e` for a parameter
//! turned from existential into generic, `n` for one left unchanged. The
//! name depends only on the original name and the selected index set, so
//! specializing the same arguments twice yields the same name.

use std::collections::BTreeSet;

pub struct ExistentialMangler<'a> {
    original: &'a str,
    param_count: usize,
    existential_to_generic: BTreeSet<usize>,
}

impl<'a> ExistentialMangler<'a> {
    pub fn new(original: &'a str, param_count: usize) -> Self {
        ExistentialMangler {
            original,
            param_count,
            existential_to_generic: BTreeSet::new(),
        }
    }

    pub fn set_argument_existential_to_generic(&mut self, index: usize) {
        assert!(
            index < self.param_count,
            "argument {index} out of range for `{}`",
            self.original
        );
        self.existential_to_generic.insert(index);
    }

    pub fn mangle(&self) -> String {
        let mut name = String::with_capacity(self.original.len() + self.param_count + 3);
        name.push_str(self.original);
        name.push_str("Tf");
        for index in 0..self.param_count {
            name.push(if self.existential_to_generic.contains(&index) {
                'e'
            } else {
                'n'
            });
        }
        name.push('_');
        name
    }
}

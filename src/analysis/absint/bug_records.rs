//! Bug records collected during the run, keyed by ICFG node.

use std::fs::File;
use std::io::Write;

use indexmap::IndexMap;

use crate::ir::NodeId;

#[derive(Debug, Clone)]
pub struct BugInfo {
    pub node: NodeId,
    pub msg: String,
}

#[derive(Debug, Default)]
pub struct BugRecords {
    overflow_bugs: IndexMap<NodeId, BugInfo>,
}

impl BugRecords {
    pub fn new() -> BugRecords {
        BugRecords::default()
    }

    pub fn is_bug_free(&self) -> bool {
        self.overflow_bugs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overflow_bugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overflow_bugs.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<&BugInfo> {
        self.overflow_bugs.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BugInfo> {
        self.overflow_bugs.values()
    }

    /// Record an overflow at `node`; the first report per node wins.
    pub fn record_overflow(&mut self, node: NodeId, msg: String) {
        if self.overflow_bugs.contains_key(&node) {
            return;
        }
        ae_warn!("potential overflow at node {}: {}; add to records", node, msg);
        self.overflow_bugs.insert(node, BugInfo { node, msg });
    }

    /// Write the report to `output_name`; an empty path discards the file
    /// but the summary still goes to the log.
    pub fn report(&self, output_name: &str) {
        ae_info!(
            "######################Full Overflow ({} found)######################",
            self.overflow_bugs.len()
        );
        let mut file = if output_name.is_empty() {
            None
        } else {
            match File::create(output_name) {
                Ok(f) => Some(f),
                Err(e) => {
                    ae_error!("cannot write bug report to `{}`: {}", output_name, e);
                    None
                }
            }
        };
        if let Some(f) = file.as_mut() {
            let _ = writeln!(
                f,
                "######################Full Overflow ({} found)######################",
                self.overflow_bugs.len()
            );
        }
        for bug in self.overflow_bugs.values() {
            ae_info!("node {}: {}", bug.node, bug.msg);
            if let Some(f) = file.as_mut() {
                let _ = writeln!(f, "node {}: {}", bug.node, bug.msg);
                let _ = writeln!(f, "---------------------------------------------");
            }
        }
    }
}

//! Target Graph Module
//!
//! Targets, their variables and their dependency/include edges, plus the
//! post-evaluation passes: binding targets to filesystem locations,
//! scanning bound sources for headers, and repairing cycles.

pub mod headers;
pub mod target;

use crate::graph::headers::SearchKind;
use crate::interpreter::state::State;
use crate::interpreter::types::ExecError;

/// Bind targets to locations and discover headers.
///
/// Three passes: bind every known target, scan every bound target for
/// headers (which may create new targets), then bind strictly so newly
/// discovered headers resolve or stay unbound.
pub fn bind_targets(state: &mut State, search_kind: SearchKind) -> Result<(), ExecError> {
    let snapshot = state.targets.ids();
    for tid in &snapshot {
        target::bind_location(state, *tid, false);
    }

    if search_kind != SearchKind::None {
        let db = headers::build_headers_db(state, search_kind);
        for tid in &snapshot {
            if state.targets.get(*tid).boundname.is_some() {
                headers::find_headers(state, *tid, 0, db.as_ref())?;
            }
        }
    }

    for tid in state.targets.ids() {
        target::bind_location(state, tid, true);
    }
    Ok(())
}

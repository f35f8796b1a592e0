//! Landmark provider selection. Every provider produces the same node
//! format; the ones backed by external planners or an LP solver report
//! themselves unavailable in this build.

use crate::decomposition::Decomposition;
use crate::error::{Error, Result};
use crate::landmarks::{create_lm_cut_landmarks, create_local_landmarks, LmGraph};
use crate::strips::StripsTask;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum LmProviderKind {
    Rhw,
    Ao1,
    Ao2,
    NativeAo,
    Local,
    LmCut,
    Dof,
}

pub fn build_landmark_graph(
    kind: LmProviderKind,
    task: &StripsTask,
    decomp: Option<&Decomposition>,
) -> Result<LmGraph> {
    let mut graph = match kind {
        LmProviderKind::Local => {
            let decomp = decomp.ok_or_else(|| {
                Error::semantic("local landmarks require a decomposition model")
            })?;
            create_local_landmarks(decomp)
        }
        LmProviderKind::LmCut => create_lm_cut_landmarks(task),
        other => {
            return Err(Error::unsupported(format!(
                "landmark provider {} is not linked into this build",
                other
            )))
        }
    };
    graph.mark_true_in_goal(&task.goal);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn provider_names_round_trip() {
        assert_eq!(LmProviderKind::from_str("lm-cut").unwrap(), LmProviderKind::LmCut);
        assert_eq!(LmProviderKind::from_str("rhw").unwrap(), LmProviderKind::Rhw);
        assert_eq!(LmProviderKind::NativeAo.to_string(), "native-ao");
    }

    #[test]
    fn external_providers_are_unavailable() {
        let task = StripsTask::default();
        let err = build_landmark_graph(LmProviderKind::Rhw, &task, None).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }
}

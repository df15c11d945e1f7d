use std::collections::HashMap;

use super::AgentInstance;

/// An agent that just started asking for permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTransition {
    /// Position in the snapshot that produced the event
    pub index: usize,
    pub instance: AgentInstance,
}

/// Output of [`PermissionTransitionDetector::transitions`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionResult {
    /// Prompt state for every session key in the new snapshot
    pub current: HashMap<String, bool>,
    /// Rising edges, in snapshot order
    pub events: Vec<PermissionTransition>,
}

/// Finds agents whose permission prompt appeared since the last poll
pub struct PermissionTransitionDetector;

impl PermissionTransitionDetector {
    /// Compare a snapshot with the prompt state recorded for the previous one
    ///
    /// An unknown key counts as "was not prompting", so an agent that is
    /// already prompting the first time it is seen produces an event. Keys
    /// missing from `instances` are not carried into the result.
    pub fn transitions(instances: &[AgentInstance], previous: &HashMap<String, bool>) -> TransitionResult {
        let mut result = TransitionResult::default();

        for (index, instance) in instances.iter().enumerate() {
            let key = instance.session_key();
            let is_prompt = instance.permission_prompt == Some(true);
            let was_prompt = previous.get(&key).copied().unwrap_or(false);

            result.current.insert(key, is_prompt);

            if is_prompt && !was_prompt {
                result.events.push(PermissionTransition {
                    index,
                    instance: instance.clone(),
                });
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agj::fixtures::instance;
    use pretty_assertions::assert_eq;

    fn state(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_detects_new_prompt() {
        let inst = instance(1, 1, None, Some(true));

        let result = PermissionTransitionDetector::transitions(&[inst.clone()], &HashMap::new());

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].instance.id, 1);
        assert_eq!(result.events[0].index, 0);
        assert_eq!(result.current.get(&inst.session_key()), Some(&true));
    }

    #[test]
    fn test_steady_prompt_does_not_refire() {
        let inst = instance(3, 77, Some("s1"), Some(true));

        let result = PermissionTransitionDetector::transitions(&[inst], &state(&[("s1", true)]));

        assert!(result.events.is_empty());
        assert_eq!(result.current, state(&[("s1", true)]));
    }

    #[test]
    fn test_falling_edge_and_unknown_produce_no_event() {
        let instances = vec![
            instance(0, 10, Some("a"), Some(false)),
            instance(1, 11, Some("b"), None),
        ];

        let result = PermissionTransitionDetector::transitions(
            &instances,
            &state(&[("a", true), ("b", false)]),
        );

        assert!(result.events.is_empty());
        assert_eq!(result.current, state(&[("a", false), ("b", false)]));
    }

    #[test]
    fn test_disappeared_keys_are_dropped() {
        let instances = vec![instance(0, 10, Some("a"), Some(false))];

        let result =
            PermissionTransitionDetector::transitions(&instances, &state(&[("gone", true)]));

        assert_eq!(result.current, state(&[("a", false)]));
    }

    #[test]
    fn test_events_follow_snapshot_order_despite_renumbering() {
        // agj renumbered the agents, but session keys still line up
        let instances = vec![
            instance(0, 30, Some("c"), Some(true)),
            instance(1, 10, Some("a"), Some(true)),
            instance(2, 20, Some("b"), Some(true)),
        ];

        let result = PermissionTransitionDetector::transitions(
            &instances,
            &state(&[("a", true), ("b", false)]),
        );

        let keys: Vec<(usize, String)> = result
            .events
            .iter()
            .map(|e| (e.index, e.instance.session_key()))
            .collect();
        assert_eq!(keys, vec![(0, "c".to_string()), (2, "b".to_string())]);
    }

    #[test]
    fn test_pid_key_used_without_session() {
        let instances = vec![instance(5, 4242, None, Some(true))];

        let result =
            PermissionTransitionDetector::transitions(&instances, &state(&[("4242", true)]));

        assert!(result.events.is_empty());
        assert_eq!(result.current, state(&[("4242", true)]));
    }
}

//! External collaborator requests.

use super::{Engine, Output, Reply};
use crate::codec;
use crate::collapse;
use crate::gateway::{self, GatewayError, ParkedRequest, RequestId};
use crate::tree::{self, AttachOptions, DetachOptions, TreeEffects};
use tabtree_protocol::{
    CollaboratorInfo, CollapseCause, ExternalRequest, ExternalResponse, TreeNotification,
};
use tokio::time::Instant;

impl Engine {
    /// Handle a request from `sender`.
    ///
    /// Requests naming tabs the registry does not know yet are parked and
    /// answered once the tabs register or the registration timeout passes;
    /// the returned id identifies the reply either way.
    pub fn handle_external(
        &mut self,
        sender: &str,
        request: ExternalRequest,
        now: Instant,
    ) -> (RequestId, Output) {
        let id = self.next_request_id();
        let mut out = Output::default();

        let parkable = !matches!(
            request,
            ExternalRequest::RegisterSelf { .. } | ExternalRequest::UnregisterSelf {}
        );
        let missing = gateway::missing_ids(&self.registry, &request);
        if parkable && !missing.is_empty() {
            log::debug!(
                "{} request {} from {:?} waits for tabs {:?}",
                request.type_name(),
                id,
                sender,
                missing
            );
            self.gateway.park(ParkedRequest {
                id,
                sender: sender.to_string(),
                request,
                deadline: now + self.config.registration_timeout(),
            });
            return (id, out);
        }

        self.process_external(id, sender, request, now, &mut out);
        (id, out)
    }

    /// Run a request and push its reply
    pub(super) fn process_external(
        &mut self,
        id: RequestId,
        sender: &str,
        request: ExternalRequest,
        now: Instant,
        out: &mut Output,
    ) {
        let kind = request.type_name();
        crate::debug_log!("GATEWAY", "#{} {} from {:?}", id, kind, sender);
        let mut effects = TreeEffects::default();
        let response = match self.run_external(sender, request, &mut effects) {
            Ok(response) => response,
            Err(error) => {
                log::warn!("{} request {} from {:?} refused: {}", kind, id, sender, error);
                ExternalResponse::Ack(false)
            }
        };
        self.flush(effects, now, out);
        out.replies.push((id, Reply::External(response)));
    }

    fn run_external(
        &mut self,
        sender: &str,
        request: ExternalRequest,
        effects: &mut TreeEffects,
    ) -> Result<ExternalResponse, GatewayError> {
        let response = match request {
            ExternalRequest::RegisterSelf {
                name,
                listening_types,
            } => {
                self.gateway.register(
                    sender,
                    CollaboratorInfo {
                        name,
                        listening_types,
                    },
                );
                ExternalResponse::Ack(true)
            }
            ExternalRequest::UnregisterSelf {} => {
                self.gateway.unregister(sender)?;
                ExternalResponse::Ack(true)
            }
            ExternalRequest::Ping {} => ExternalResponse::Ack(true),
            ExternalRequest::GetTree { target } => {
                let tabs = gateway::resolve_targets(&self.registry, &target);
                gateway::format_tabs(&self.registry, &target, &tabs)
            }
            ExternalRequest::GetTreeStructure { target } => {
                let tabs = gateway::resolve_targets(&self.registry, &target);
                ExternalResponse::Structure(codec::serialize(&self.registry, &tabs))
            }
            ExternalRequest::SetTreeStructure { target, structure } => {
                let tabs = gateway::resolve_targets(&self.registry, &target);
                if tabs.is_empty() {
                    return Err(GatewayError::InvalidRequest(
                        "set-tree-structure matched no tabs".to_string(),
                    ));
                }
                let report = codec::restore(&mut self.registry, &structure, &tabs, effects);
                log::info!("{:?} applied tree structure: {:?}", sender, report);
                ExternalResponse::Ack(true)
            }
            ExternalRequest::CollapseTree { target } | ExternalRequest::ExpandTree { target }
                if gateway::resolve_targets(&self.registry, &target).is_empty() =>
            {
                ExternalResponse::Ack(false)
            }
            ExternalRequest::CollapseTree { target } => {
                for tab in gateway::resolve_targets(&self.registry, &target) {
                    collapse::set_collapsed(&mut self.registry, tab, true, CollapseCause::Manual, effects);
                }
                ExternalResponse::Ack(true)
            }
            ExternalRequest::ExpandTree { target } => {
                for tab in gateway::resolve_targets(&self.registry, &target) {
                    collapse::set_collapsed(&mut self.registry, tab, false, CollapseCause::Manual, effects);
                }
                ExternalResponse::Ack(true)
            }
            ExternalRequest::Attach {
                child,
                parent,
                insert_before,
                insert_after,
            } => {
                if child == parent {
                    return Err(GatewayError::InvalidRequest(format!(
                        "tab {child} cannot be its own parent"
                    )));
                }
                ExternalResponse::Ack(tree::attach(
                    &mut self.registry,
                    child,
                    parent,
                    AttachOptions {
                        insert_before,
                        insert_after,
                        insert_at: self.config.insert_new_child_at,
                        force_expand: false,
                        move_now: true,
                    },
                    effects,
                ))
            }
            ExternalRequest::Detach { tab } => ExternalResponse::Ack(tree::detach(
                &mut self.registry,
                tab,
                DetachOptions::default(),
                effects,
            )),
            ExternalRequest::AddTabState { target, states } => {
                let states = states.into_vec();
                let tabs = gateway::resolve_targets(&self.registry, &target);
                for &tab in &tabs {
                    if let Some(node) = self.registry.get_mut(tab) {
                        node.states.extend(states.iter().cloned());
                    }
                }
                if !tabs.is_empty() {
                    effects.notifications.push(TreeNotification::TabStateChanged {
                        tabs: tabs.clone(),
                        added: states,
                        removed: Vec::new(),
                    });
                }
                ExternalResponse::Ack(!tabs.is_empty())
            }
            ExternalRequest::RemoveTabState { target, states } => {
                let states = states.into_vec();
                let tabs = gateway::resolve_targets(&self.registry, &target);
                for &tab in &tabs {
                    if let Some(node) = self.registry.get_mut(tab) {
                        node.states.retain(|state| !states.contains(state));
                    }
                }
                if !tabs.is_empty() {
                    effects.notifications.push(TreeNotification::TabStateChanged {
                        tabs: tabs.clone(),
                        added: Vec::new(),
                        removed: states,
                    });
                }
                ExternalResponse::Ack(!tabs.is_empty())
            }
            ExternalRequest::ScrollLock {} => {
                self.gateway.lock_scroll(sender);
                ExternalResponse::Ack(true)
            }
            ExternalRequest::ScrollUnlock {} => ExternalResponse::Ack(self.gateway.unlock_scroll(sender)),
            ExternalRequest::BlockGrouping {} => {
                self.gateway.block_grouping(sender);
                ExternalResponse::Ack(true)
            }
            ExternalRequest::UnblockGrouping {} => {
                self.gateway.unblock_grouping(sender);
                ExternalResponse::Ack(true)
            }
        };
        Ok(response)
    }
}

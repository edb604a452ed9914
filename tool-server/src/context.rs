//! Per-request caller context.
//!
//! The transport is stateless: each call authenticates independently and the
//! middleware installs the context in a task-local slot for the duration of
//! the handler. `task_local::scope` clears it on every exit path, panic and
//! cancellation included.

use taskflow_core::Principal;

/// How the caller authenticated, kept so outbound REST calls can present the
/// same credential.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Original bearer token, forwarded verbatim
    Bearer(String),
    /// Development mode: identity forwarded via trusted headers
    Dev { user_id: String },
}

#[derive(Debug, Clone)]
pub struct ToolContext {
    pub principal: Principal,
    pub credential: Credential,
    /// Tenant header forwarded in dev mode
    pub tenant_header: Option<String>,
}

tokio::task_local! {
    static CURRENT_CONTEXT: ToolContext;
}

/// Run `fut` with the context installed.
pub async fn with_context<F>(ctx: ToolContext, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CURRENT_CONTEXT.scope(ctx, fut).await
}

/// The current request's context, if the middleware installed one.
pub fn current() -> Option<ToolContext> {
    CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_core::principal::CredentialKind;

    fn ctx() -> ToolContext {
        ToolContext {
            principal: Principal {
                external_id: "user-1".to_string(),
                email: String::new(),
                name: String::new(),
                tenant_claim: None,
                organization_ids: vec![],
                client_id: None,
                client_name: None,
                credential: CredentialKind::Dev,
            },
            credential: Credential::Dev {
                user_id: "user-1".to_string(),
            },
            tenant_header: None,
        }
    }

    #[tokio::test]
    async fn test_context_scoped_to_task() {
        assert!(current().is_none());
        with_context(ctx(), async {
            assert_eq!(current().unwrap().principal.external_id, "user-1");
        })
        .await;
        assert!(current().is_none());
    }
}

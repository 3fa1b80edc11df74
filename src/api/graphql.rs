use async_graphql::{Context, EmptySubscription, Object, Schema};
use std::sync::Arc;

use crate::domain::dispatch::ActionRequest;
use crate::domain::fleet_service::FleetService;
use crate::domain::types::*;
use crate::remote::SshChannel;

pub type Fleet = FleetService<SshChannel>;

pub type FleetSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Cached status of every configured host. Never triggers remote calls.
    async fn fleet_status(&self, ctx: &Context<'_>) -> async_graphql::Result<FleetStatus> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        Ok(fleet.fleet_status().await)
    }

    async fn logs(&self, ctx: &Context<'_>, host: String) -> async_graphql::Result<LogsResponse> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        Ok(fleet.logs(&host).await)
    }

    async fn hosts(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<String>> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        Ok(fleet.hosts().to_vec())
    }

    async fn health(&self, ctx: &Context<'_>) -> async_graphql::Result<DaemonHealth> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        Ok(fleet.health().await)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn perform_action(
        &self,
        ctx: &Context<'_>,
        action: String,
        host: Option<String>,
        #[graphql(default)] channel: String,
        #[graphql(default = 100)] viewers: u32,
        location: Option<String>,
    ) -> async_graphql::Result<ActionResponse> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        let request = ActionRequest {
            action,
            host,
            channel,
            viewers,
            location,
        };
        Ok(fleet.perform_action(&request).await)
    }

    /// Check one host now and store the result in the status cache.
    async fn check_host(&self, ctx: &Context<'_>, host: String) -> async_graphql::Result<HostStatus> {
        let fleet = ctx.data::<Arc<Fleet>>()?;
        fleet
            .check_host(&host)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}

pub fn build_schema(fleet: Arc<Fleet>) -> FleetSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(fleet)
        .finish()
}

//! Port alias registry with guard clauses and quota accounting

use std::sync::Arc;

use netrec_core::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Wildcard aliases seeded for the platform tenant: (name, protocol)
pub const SYSTEM_ALIASES: &[(&str, &str)] =
    &[("any tcp", "tcp"), ("any udp", "udp"), ("any icmp", "icmp")];

/// Port alias registry
///
/// Guards run before any store or quota call, for every caller including
/// admins. Aliases of other tenants are reported as missing to non-admins.
pub struct PortAliasRegistry {
    aliases: Arc<dyn AliasStore>,
    quota: Arc<dyn QuotaDriver>,
    platform_tenant: TenantId,
}

impl PortAliasRegistry {
    pub fn new(
        aliases: Arc<dyn AliasStore>,
        quota: Arc<dyn QuotaDriver>,
        platform_tenant: impl Into<TenantId>,
    ) -> Self {
        Self {
            aliases,
            quota,
            platform_tenant: platform_tenant.into(),
        }
    }

    pub fn platform_tenant(&self) -> &str {
        &self.platform_tenant
    }

    /// Create an alias, consuming one unit of the tenant's `portalias` quota
    pub async fn create(&self, ctx: &RequestContext, req: CreatePortAlias) -> Result<PortAlias> {
        if req.port == 0 {
            return Err(Error::policy("creation of wildcard port aliases"));
        }
        check_protocol(&req.protocol)?;
        if !ctx.owns(&req.tenant_id) {
            return Err(Error::policy(format!(
                "creation of port aliases for tenant {}",
                req.tenant_id
            )));
        }

        let reservation = self
            .quota
            .reserve(&req.tenant_id, PORTALIAS_RESOURCE, 1)
            .await?;

        match self.aliases.create_alias(req).await {
            Ok(alias) => {
                info!(
                    "Created port alias {} ({}/{}) for tenant {}",
                    alias.id, alias.protocol, alias.port, alias.tenant_id
                );
                Ok(alias)
            }
            Err(e) => {
                if let Err(release_err) = self.quota.release(reservation).await {
                    warn!("Failed to release port alias reservation: {}", release_err);
                }
                Err(e)
            }
        }
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        alias_id: Uuid,
        patch: PortAliasUpdate,
    ) -> Result<PortAlias> {
        let alias = self.aliases.get_alias(alias_id).await?;
        if alias.is_system() {
            return Err(Error::policy("modification of system port aliases"));
        }
        self.check_writable(ctx, &alias)?;
        if patch.port == Some(0) {
            return Err(Error::policy("creation of wildcard port aliases"));
        }
        if let Some(protocol) = &patch.protocol {
            check_protocol(protocol)?;
        }

        let alias = self.aliases.update_alias(alias_id, patch).await?;
        info!("Updated port alias {}", alias.id);
        Ok(alias)
    }

    /// Delete an alias and return its quota unit
    pub async fn delete(&self, ctx: &RequestContext, alias_id: Uuid) -> Result<()> {
        let alias = self.aliases.get_alias(alias_id).await?;
        if alias.is_system() {
            return Err(Error::policy("deletion of system port aliases"));
        }
        self.check_writable(ctx, &alias)?;

        self.aliases.delete_alias(alias_id).await?;
        info!("Deleted port alias {}", alias_id);

        // The alias stays deleted when the release fails
        self.quota
            .release(Reservation::new(alias.tenant_id.as_str(), PORTALIAS_RESOURCE, 1))
            .await
            .map_err(|e| {
                warn!("Failed to release quota for port alias {}: {}", alias_id, e);
                e
            })
    }

    pub async fn get(&self, ctx: &RequestContext, alias_id: Uuid) -> Result<PortAlias> {
        let alias = self.aliases.get_alias(alias_id).await?;
        if !self.visible(ctx, &alias) {
            return Err(not_found(alias_id));
        }
        Ok(alias)
    }

    /// Admins see every alias; tenants see their own and the platform's
    pub async fn list(&self, ctx: &RequestContext, filter: &PortAliasFilter) -> Result<Vec<PortAlias>> {
        if ctx.is_admin {
            return self.aliases.list_aliases(None, filter).await;
        }

        let mut aliases = self
            .aliases
            .list_aliases(Some(&ctx.tenant_id), filter)
            .await?;
        if ctx.tenant_id != self.platform_tenant {
            aliases.extend(
                self.aliases
                    .list_aliases(Some(&self.platform_tenant), filter)
                    .await?,
            );
        }
        Ok(aliases)
    }

    /// Seed the wildcard aliases for the platform tenant. Returns the
    /// aliases created by this call.
    pub async fn ensure_system_aliases(&self) -> Result<Vec<PortAlias>> {
        let mut created = Vec::new();
        for (name, protocol) in SYSTEM_ALIASES {
            let filter = PortAliasFilter {
                name: None,
                protocol: Some(protocol.to_string()),
                port: Some(0),
            };
            let existing = self
                .aliases
                .list_aliases(Some(&self.platform_tenant), &filter)
                .await?;
            if !existing.is_empty() {
                debug!("System alias {} already present", name);
                continue;
            }

            let alias = self
                .aliases
                .create_alias(CreatePortAlias {
                    tenant_id: self.platform_tenant.clone(),
                    name: name.to_string(),
                    protocol: protocol.to_string(),
                    port: 0,
                })
                .await?;
            info!("Created system port alias '{}' ({})", alias.name, alias.id);
            created.push(alias);
        }
        Ok(created)
    }

    fn visible(&self, ctx: &RequestContext, alias: &PortAlias) -> bool {
        ctx.owns(&alias.tenant_id) || alias.tenant_id == self.platform_tenant
    }

    fn check_writable(&self, ctx: &RequestContext, alias: &PortAlias) -> Result<()> {
        if ctx.owns(&alias.tenant_id) {
            return Ok(());
        }
        if alias.tenant_id == self.platform_tenant {
            return Err(Error::policy("modification of platform port aliases"));
        }
        Err(not_found(alias.id))
    }
}

fn check_protocol(protocol: &str) -> Result<()> {
    if protocol.trim().is_empty() {
        return Err(Error::validation("port alias protocol must not be empty"));
    }
    Ok(())
}

fn not_found(alias_id: Uuid) -> Error {
    Error::not_found(format!("{} {}", ResourceKind::PortAlias, alias_id))
}

//! The addon reconciler (§4.6.3): drives `pending` addons through
//! provisioning on the external addon control plane, and finishes
//! soft-deleted addons by releasing their backing resources.

use crate::cluster::{AddonProvisioner, AddonRequest};
use crate::store::Store;
use tracing::{error, info, warn};

pub async fn run_addon_loop(store: &Store, provisioner: &dyn AddonProvisioner, encryption_key: Option<&str>) {
    provision_pending(store, provisioner, encryption_key).await;
    finish_deleting(store, provisioner).await;
}

async fn provision_pending(store: &Store, provisioner: &dyn AddonProvisioner, encryption_key: Option<&str>) {
    let pending = match crate::store::project::list(store.pool()).await {
        Ok(projects) => {
            let mut all = Vec::new();
            for project in projects {
                match crate::store::addon::list_for_project(store.pool(), &project.id).await {
                    Ok(addons) => all.extend(addons.into_iter().filter(|a| a.status == "pending")),
                    Err(err) => {
                        error!(error = %err, project_id = %project.id, "failed to list addons");
                    }
                }
            }
            all
        }
        Err(err) => {
            error!(error = %err, "failed to list projects for addon reconciliation");
            return;
        }
    };

    for addon in pending {
        if let Err(err) = crate::store::addon::set_status(store.pool(), &addon.id, "provisioning").await {
            warn!(error = %err, addon_id = %addon.id, "addon already claimed");
            continue;
        }

        let request = AddonRequest {
            addon_id: addon.id.clone(),
            addon_type: addon.addon_type.clone(),
            config: addon.config.clone(),
        };

        match provisioner.provision(&request).await {
            Ok(provisioned) => {
                let key = encryption_key.map(crate::crypto::derive_key);
                let secret_ref = match crate::crypto::encrypt_if_key_available(
                    &provisioned.secret_ref,
                    key.as_ref(),
                ) {
                    Ok(value) => value,
                    Err(err) => {
                        error!(error = %err, addon_id = %addon.id, "failed to encrypt addon secret");
                        provisioned.secret_ref.clone()
                    }
                };
                let _ = crate::store::addon::transition_ready(
                    store.pool(),
                    &addon.id,
                    &provisioned.host,
                    provisioned.port,
                    &provisioned.database_name,
                    &provisioned.username,
                    &secret_ref,
                )
                .await;
                info!(addon_id = %addon.id, "addon provisioned");
            }
            Err(err) => {
                error!(error = %err, addon_id = %addon.id, "addon provisioning failed");
                let _ = crate::store::addon::set_status(store.pool(), &addon.id, "failed").await;
            }
        }
    }
}

async fn finish_deleting(store: &Store, provisioner: &dyn AddonProvisioner) {
    let deleting = match crate::store::addon::list_deleting(store.pool()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list addons pending teardown");
            return;
        }
    };

    for addon in deleting {
        if provisioner.deprovision(&addon.id).await.is_ok() {
            let _ = crate::store::addon::mark_deleted(store.pool(), &addon.id).await;
            info!(addon_id = %addon.id, "addon backing resources released");
        }
    }
}

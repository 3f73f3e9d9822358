// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ChirpStack control-plane client.
//!
//! Talks to the network server's REST API with a bearer token: enumerates
//! tenants, applications, devices and multicast groups, flushes device
//! queues, and enqueues downlink frames. Frame payloads are base64-encoded
//! at this boundary as the API requires; on multicast the server assigns the
//! real frame counter, `fCnt = 1` is only a placeholder.
//!
//! The client is stateless apart from the pooled HTTP connection and can be
//! shared by several drivers in one process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{DownlinkQueue, TransportError};
use crate::context::ServerContext;

const LIST_LIMIT: u32 = 10;

/// Blocking REST client for the ChirpStack API.
pub struct ChirpStackClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct TenantItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeviceItem {
    #[serde(rename = "devEui")]
    pub dev_eui: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MulticastGroupItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
struct DeviceQueueItem<'a> {
    #[serde(rename = "devEui")]
    dev_eui: &'a str,
    #[serde(rename = "fPort")]
    f_port: u8,
    data: String,
}

#[derive(Debug, Serialize)]
struct DeviceQueueRequest<'a> {
    #[serde(rename = "queueItem")]
    queue_item: DeviceQueueItem<'a>,
}

#[derive(Debug, Serialize)]
struct MulticastQueueItem<'a> {
    #[serde(rename = "multicastGroupId")]
    multicast_group_id: &'a str,
    #[serde(rename = "fCnt")]
    f_cnt: u32,
    #[serde(rename = "fPort")]
    f_port: u8,
    data: String,
}

#[derive(Debug, Serialize)]
struct MulticastQueueRequest<'a> {
    #[serde(rename = "queueItem")]
    queue_item: MulticastQueueItem<'a>,
}

/// Identifiers discovered by [`ChirpStackClient::bootstrap`].
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Application the target device belongs to; used for the uplink
    /// subscription.
    pub application_id: String,
    /// First multicast group of the application, when one exists.
    pub multicast_group_id: Option<String>,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl ChirpStackClient {
    /// Build a client for `http://{server}:{api_port}/api`.
    pub fn new(context: &ServerContext, api_port: u16) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("http://{}:{}/api", context.server, api_port),
            token: context.api_token.clone(),
        })
    }

    fn check(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn get_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TransportError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .query(&[("limit", LIST_LIMIT.to_string())])
            .query(query)
            .send()?;
        let list: ListResponse<T> = Self::check(response)?
            .json()
            .map_err(|e| TransportError::Json(e.to_string()))?;
        Ok(list.result)
    }

    /// List tenants visible to the API token.
    pub fn list_tenants(&self) -> Result<Vec<TenantItem>, TransportError> {
        self.get_list("/tenants", &[])
    }

    /// List applications of one tenant.
    pub fn list_applications(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ApplicationItem>, TransportError> {
        self.get_list("/applications", &[("tenantId", tenant_id.to_string())])
    }

    /// List devices of one application.
    pub fn list_devices(&self, application_id: &str) -> Result<Vec<DeviceItem>, TransportError> {
        self.get_list("/devices", &[("applicationId", application_id.to_string())])
    }

    /// List multicast groups of one application.
    pub fn list_multicast_groups(
        &self,
        application_id: &str,
    ) -> Result<Vec<MulticastGroupItem>, TransportError> {
        self.get_list(
            "/multicast-groups",
            &[("applicationId", application_id.to_string())],
        )
    }

    /// Drop all pending downlinks queued for a device.
    pub fn flush_device_queue(&self, dev_eui: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .delete(format!("{}/devices/{}/queue", self.base_url, dev_eui))
            .bearer_auth(&self.token)
            .send()?;
        Self::check(response)?;
        log::debug!("[CHIRPSTACK] flushed downlink queue of {}", dev_eui);
        Ok(())
    }

    /// Resolve the identifiers a session needs: first tenant, its first
    /// application, that application's first multicast group. Also flushes
    /// any stale downlinks queued for the target device.
    pub fn bootstrap(&self, dev_eui: &str) -> Result<Bootstrap, TransportError> {
        let tenants = self.list_tenants()?;
        let tenant = tenants.first().ok_or_else(|| TransportError::Rejected {
            status: 404,
            body: "no tenant visible to this API token".into(),
        })?;

        let applications = self.list_applications(&tenant.id)?;
        let application = applications
            .first()
            .ok_or_else(|| TransportError::Rejected {
                status: 404,
                body: format!("tenant {} has no application", tenant.id),
            })?;

        let devices = self.list_devices(&application.id)?;
        if !devices.iter().any(|d| d.dev_eui == dev_eui) {
            log::warn!(
                "[CHIRPSTACK] device {} not among the first {} devices of application {}",
                dev_eui,
                LIST_LIMIT,
                application.id
            );
        }

        let groups = self.list_multicast_groups(&application.id)?;
        let multicast_group_id = groups.first().map(|g| g.id.clone());

        self.flush_device_queue(dev_eui)?;

        log::info!(
            "[CHIRPSTACK] application {} | {} devices | multicast group {}",
            application.id,
            devices.len(),
            multicast_group_id.as_deref().unwrap_or("-")
        );

        Ok(Bootstrap {
            application_id: application.id.clone(),
            multicast_group_id,
        })
    }
}

impl DownlinkQueue for ChirpStackClient {
    fn enqueue_unicast(
        &self,
        dev_eui: &str,
        port: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        log::debug!(
            "[CHIRPSTACK] unicast to {} on port {} ({} bytes)",
            dev_eui,
            port,
            data.len()
        );
        let request = DeviceQueueRequest {
            queue_item: DeviceQueueItem {
                dev_eui,
                f_port: port,
                data: BASE64.encode(data),
            },
        };
        let response = self
            .http
            .post(format!("{}/devices/{}/queue", self.base_url, dev_eui))
            .bearer_auth(&self.token)
            .json(&request)
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn enqueue_multicast(
        &self,
        group_id: &str,
        port: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        log::debug!(
            "[CHIRPSTACK] multicast to group {} on port {} ({} bytes)",
            group_id,
            port,
            data.len()
        );
        let request = MulticastQueueRequest {
            queue_item: MulticastQueueItem {
                multicast_group_id: group_id,
                // The network server overwrites the multicast frame counter;
                // the field is mandatory in the request.
                f_cnt: 1,
                f_port: port,
                data: BASE64.encode(data),
            },
        };
        let response = self
            .http
            .post(format!(
                "{}/multicast-groups/{}/queue",
                self.base_url, group_id
            ))
            .bearer_auth(&self.token)
            .json(&request)
            .send()?;
        Self::check(response)?;
        Ok(())
    }
}

//! Service schemas
//!
//! A schema is an encoded protobuf `FileDescriptorSet` (as produced by
//! `protoc --descriptor_set_out` or `tonic-prost-build`). Only the service
//! and method declarations are kept; message layouts stay with the generated
//! prost types the caller already uses.

use crate::error::{ClientError, Result};
use prost::Message;
use prost_types::FileDescriptorSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One RPC method of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    /// Fully-qualified request message name, without the leading dot
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodDescriptor {
    pub fn is_unary(&self) -> bool {
        !self.client_streaming && !self.server_streaming
    }
}

/// A service declared in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub package: String,
    pub name: String,
    /// `package.Name`, or just `Name` for services outside a package
    pub full_name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// HTTP/2 path of a method, e.g. `/follicore.vision.VisionService/Analyze`
    pub fn method_path(&self, method: &str) -> String {
        format!("/{}/{}", self.full_name, method)
    }
}

/// Parsed schema, cheap to clone
#[derive(Debug, Clone)]
pub struct Schema {
    id: Arc<str>,
    services: Arc<Vec<ServiceDescriptor>>,
}

impl Schema {
    /// Decode an encoded `FileDescriptorSet`; `id` names the schema in stub cache keys
    pub fn from_bytes(id: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let set = FileDescriptorSet::decode(bytes)?;
        Ok(Self::from_descriptor_set(id, &set))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ClientError::Schema(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        Self::from_bytes(path.display().to_string(), &bytes)
    }

    pub fn from_descriptor_set(id: impl Into<String>, set: &FileDescriptorSet) -> Self {
        let mut services = Vec::new();
        for file in &set.file {
            let package = file.package().to_string();
            for service in &file.service {
                let name = service.name().to_string();
                let full_name = if package.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", package, name)
                };
                let methods = service
                    .method
                    .iter()
                    .map(|m| MethodDescriptor {
                        name: m.name().to_string(),
                        input_type: m.input_type().trim_start_matches('.').to_string(),
                        output_type: m.output_type().trim_start_matches('.').to_string(),
                        client_streaming: m.client_streaming(),
                        server_streaming: m.server_streaming(),
                    })
                    .collect();
                services.push(ServiceDescriptor {
                    package: package.clone(),
                    name,
                    full_name,
                    methods,
                });
            }
        }

        Self {
            id: Arc::from(id.into()),
            services: Arc::new(services),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }

    /// Look a service up by fully-qualified name, or by bare name when that is unambiguous
    pub fn service(&self, name: &str) -> Result<&ServiceDescriptor> {
        if let Some(service) = self.services.iter().find(|s| s.full_name == name) {
            return Ok(service);
        }

        let mut bare = self.services.iter().filter(|s| s.name == name);
        match (bare.next(), bare.next()) {
            (Some(service), None) => Ok(service),
            (Some(_), Some(_)) => Err(ClientError::Config(format!(
                "Service name '{}' is ambiguous in schema {}; use the fully-qualified name",
                name, self.id
            ))),
            (None, _) => Err(ClientError::Config(format!(
                "Service '{}' not found in schema {}",
                name, self.id
            ))),
        }
    }
}

/// Schemas loaded from disk, parsed once per path
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Mutex<HashMap<PathBuf, Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the schema at `path`, reusing an earlier parse of the same file
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Schema> {
        let path = path.as_ref();
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if let Some(schema) = self.lock()?.get(&key) {
            debug!(path = %key.display(), "schema cache hit");
            return Ok(schema.clone());
        }

        let schema = Schema::from_file(&key)?;
        debug!(
            path = %key.display(),
            services = schema.services.len(),
            "schema loaded"
        );
        self.lock()?.insert(key, schema.clone());
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, Schema>>> {
        self.schemas
            .lock()
            .map_err(|_| ClientError::Schema("schema registry lock poisoned".to_string()))
    }
}

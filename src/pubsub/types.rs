//! Resource names and handles returned by the facade.

use crate::error::{Error, Result, ValidationError};
use crate::types::validation::{validate_project_id, validate_subscription_id, validate_topic_id};
use crate::types::SubscriptionConfig;
use std::fmt;
use std::time::Duration;

/// Represents a parsed Pub/Sub resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceName {
    /// Topic resource: projects/{project}/topics/{topic}
    Topic {
        /// The GCP project ID
        project: String,
        /// The topic name
        topic: String,
    },
    /// Subscription resource: projects/{project}/subscriptions/{subscription}
    Subscription {
        /// The GCP project ID
        project: String,
        /// The subscription name
        subscription: String,
    },
}

impl ResourceName {
    /// Parse a resource name string into a ResourceName.
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('/').collect();

        if parts.len() != 4 || parts[0] != "projects" {
            return Err(Error::Validation(ValidationError::InvalidParameter {
                name: "resource_name".to_string(),
                reason: format!("Invalid resource name format: {}", name),
            }));
        }

        let project = parts[1].to_string();
        let resource_type = parts[2];
        let resource_id = parts[3].to_string();

        match resource_type {
            "topics" => Ok(ResourceName::Topic {
                project,
                topic: resource_id,
            }),
            "subscriptions" => Ok(ResourceName::Subscription {
                project,
                subscription: resource_id,
            }),
            _ => Err(Error::Validation(ValidationError::InvalidParameter {
                name: "resource_type".to_string(),
                reason: format!("Unknown resource type: {}", resource_type),
            })),
        }
    }

    /// Resolve a topic given as a short ID or a fully-qualified name.
    ///
    /// Short IDs are qualified with `project`. Both forms are validated.
    pub fn resolve_topic(project: &str, name: &str) -> Result<Self> {
        let resolved = if name.contains('/') {
            match Self::parse(name)? {
                topic @ ResourceName::Topic { .. } => topic,
                _ => {
                    return Err(Error::Validation(ValidationError::InvalidTopicId(format!(
                        "{} is not a topic name",
                        name
                    ))))
                }
            }
        } else {
            ResourceName::Topic {
                project: project.to_string(),
                topic: name.to_string(),
            }
        };

        validate_project_id(resolved.project())?;
        validate_topic_id(resolved.resource_id())?;
        Ok(resolved)
    }

    /// Resolve a subscription given as a short ID or a fully-qualified name.
    pub fn resolve_subscription(project: &str, name: &str) -> Result<Self> {
        let resolved = if name.contains('/') {
            match Self::parse(name)? {
                subscription @ ResourceName::Subscription { .. } => subscription,
                _ => {
                    return Err(Error::Validation(ValidationError::InvalidSubscriptionId(
                        format!("{} is not a subscription name", name),
                    )))
                }
            }
        } else {
            ResourceName::Subscription {
                project: project.to_string(),
                subscription: name.to_string(),
            }
        };

        validate_project_id(resolved.project())?;
        validate_subscription_id(resolved.resource_id())?;
        Ok(resolved)
    }

    /// Get the project ID from the resource name.
    pub fn project(&self) -> &str {
        match self {
            ResourceName::Topic { project, .. } => project,
            ResourceName::Subscription { project, .. } => project,
        }
    }

    /// Get the resource ID (topic or subscription name).
    pub fn resource_id(&self) -> &str {
        match self {
            ResourceName::Topic { topic, .. } => topic,
            ResourceName::Subscription { subscription, .. } => subscription,
        }
    }

    /// Format a topic resource name.
    pub fn topic(project: impl Into<String>, topic: impl Into<String>) -> String {
        format!("projects/{}/topics/{}", project.into(), topic.into())
    }

    /// Format a subscription resource name.
    pub fn subscription(project: impl Into<String>, subscription: impl Into<String>) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            project.into(),
            subscription.into()
        )
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceName::Topic { project, topic } => {
                write!(f, "projects/{}/topics/{}", project, topic)
            }
            ResourceName::Subscription {
                project,
                subscription,
            } => {
                write!(f, "projects/{}/subscriptions/{}", project, subscription)
            }
        }
    }
}

/// Handle to a topic known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: String,
    id: String,
}

impl Topic {
    pub(crate) fn new(resource: &ResourceName) -> Self {
        Self {
            name: resource.to_string(),
            id: resource.resource_id().to_string(),
        }
    }

    /// Fully-qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short topic ID.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Handle to a subscription known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    name: String,
    id: String,
    topic: String,
    ack_deadline: Duration,
}

impl Subscription {
    pub(crate) fn from_config(resource: &ResourceName, config: &SubscriptionConfig) -> Self {
        Self {
            name: resource.to_string(),
            id: resource.resource_id().to_string(),
            topic: config.topic.clone(),
            ack_deadline: config.ack_deadline(),
        }
    }

    /// Fully-qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short subscription ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fully-qualified name of the bound topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ack deadline the backend applies to deliveries.
    pub fn ack_deadline(&self) -> Duration {
        self.ack_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_parsing() {
        let name = "projects/test-project/topics/test-topic";
        let parsed = ResourceName::parse(name).unwrap();
        assert_eq!(parsed.project(), "test-project");
        assert_eq!(parsed.resource_id(), "test-topic");

        let name = "projects/test-project/subscriptions/test-sub";
        let parsed = ResourceName::parse(name).unwrap();
        assert_eq!(parsed.project(), "test-project");
        assert_eq!(parsed.resource_id(), "test-sub");
    }

    #[test]
    fn test_resource_name_formatting() {
        let topic = ResourceName::topic("test-project", "test-topic");
        assert_eq!(topic, "projects/test-project/topics/test-topic");

        let sub = ResourceName::subscription("test-project", "test-sub");
        assert_eq!(sub, "projects/test-project/subscriptions/test-sub");
    }

    #[test]
    fn test_resource_name_unknown_type() {
        let result = ResourceName::parse("projects/test-project/snapshots/snap");

        match result {
            Err(Error::Validation(ValidationError::InvalidParameter { name, reason })) => {
                assert_eq!(name, "resource_type");
                assert!(reason.contains("Unknown resource type"));
            }
            _ => panic!("Expected InvalidParameter error"),
        }
    }

    #[test]
    fn test_resolve_short_topic() {
        let resolved = ResourceName::resolve_topic("test-project", "orders").unwrap();
        assert_eq!(resolved.to_string(), "projects/test-project/topics/orders");
    }

    #[test]
    fn test_resolve_qualified_topic_keeps_project() {
        let resolved =
            ResourceName::resolve_topic("test-project", "projects/other-project/topics/orders").unwrap();
        assert_eq!(resolved.project(), "other-project");
    }

    #[test]
    fn test_resolve_rejects_wrong_kind() {
        let result =
            ResourceName::resolve_topic("test-project", "projects/test-project/subscriptions/orders");
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidTopicId(_)))
        ));

        let result = ResourceName::resolve_subscription("test-project", "projects/test-project/topics/orders");
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidSubscriptionId(_)))
        ));
    }

    #[test]
    fn test_resolve_validates_ids() {
        assert!(ResourceName::resolve_topic("test-project", "1bad").is_err());
        assert!(ResourceName::resolve_subscription("test-project", "s").is_err());
        assert!(ResourceName::resolve_topic("", "orders").is_err());
        assert!(ResourceName::resolve_topic("test-project", "projects//topics/orders").is_err());
    }

    #[test]
    fn test_resolve_accepts_domain_scoped_project() {
        let resolved = ResourceName::resolve_topic("example.com:my-project", "orders").unwrap();
        assert_eq!(resolved.to_string(), "projects/example.com:my-project/topics/orders");

        let parsed =
            ResourceName::resolve_subscription("test", "projects/example.com:my-project/subscriptions/orders-sub")
                .unwrap();
        assert_eq!(parsed.project(), "example.com:my-project");
    }

    #[test]
    fn test_handles() {
        let resource = ResourceName::resolve_subscription("test-project", "orders-sub").unwrap();
        let config = SubscriptionConfig {
            name: resource.to_string(),
            topic: "projects/test-project/topics/orders".to_string(),
            ack_deadline_seconds: 20,
        };
        let sub = Subscription::from_config(&resource, &config);
        assert_eq!(sub.id(), "orders-sub");
        assert_eq!(sub.name(), "projects/test-project/subscriptions/orders-sub");
        assert_eq!(sub.topic(), "projects/test-project/topics/orders");
        assert_eq!(sub.ack_deadline(), Duration::from_secs(20));

        let topic = Topic::new(&ResourceName::resolve_topic("test-project", "orders").unwrap());
        assert_eq!(topic.id(), "orders");
        assert_eq!(topic.name(), "projects/test-project/topics/orders");
    }
}

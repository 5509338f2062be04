use reqwest::StatusCode;
use tracing::{info, warn};

use super::client::{ConstitutionClient, NewPrinciple, NewTenant};

const BASELINE_TENANT: NewTenant<'static> = NewTenant {
    name: "Test Tenant",
    slug: "test-tenant",
};

const BASELINE_PRINCIPLES: [NewPrinciple<'static>; 3] = [
    NewPrinciple {
        principle: "All user data must be encrypted at rest and in transit",
        category: "Security",
    },
    NewPrinciple {
        principle: "All user interfaces must be accessible following WCAG guidelines",
        category: "Accessibility",
    },
    NewPrinciple {
        principle: "All code must be reviewed before deployment",
        category: "Quality",
    },
];

/// Tally of one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub created: usize,
    pub already_present: usize,
    pub rejected: usize,
}

impl SeedOutcome {
    /// Every fixture exists now, whether created here or earlier.
    pub fn is_clean(&self) -> bool {
        self.rejected == 0
    }

    fn record(&mut self, fixture: &str, result: crate::error::Result<StatusCode>) {
        match result {
            Ok(status) if status == StatusCode::OK || status == StatusCode::CREATED => {
                self.created += 1;
            }
            Ok(status) if status == StatusCode::CONFLICT => self.already_present += 1,
            Ok(status) => {
                warn!(fixture, status = status.as_u16(), "failed to create fixture");
                self.rejected += 1;
            }
            Err(e) => {
                warn!(fixture, error = %e, "could not create fixture");
                self.rejected += 1;
            }
        }
    }
}

/// Seeds the baseline tenant and principles downstream suites expect.
pub struct TestDataSeeder<'a> {
    client: &'a ConstitutionClient,
}

impl<'a> TestDataSeeder<'a> {
    pub fn new(client: &'a ConstitutionClient) -> Self {
        Self { client }
    }

    /// Never fails the run: rejected fixtures are logged and counted.
    pub async fn seed(&self) -> SeedOutcome {
        let mut outcome = SeedOutcome::default();

        outcome.record(
            BASELINE_TENANT.slug,
            self.client.create_tenant(&BASELINE_TENANT).await,
        );

        for principle in &BASELINE_PRINCIPLES {
            outcome.record(
                principle.category,
                self.client.create_principle(principle).await,
            );
        }

        info!(
            created = outcome.created,
            already_present = outcome.already_present,
            rejected = outcome.rejected,
            "test data seeded"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, route: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_seed_creates_everything() {
        let server = MockServer::start().await;
        mount(&server, "/api/v1/tenants", 201).await;
        mount(&server, "/api/v1/principles", 200).await;

        let client = ConstitutionClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let outcome = TestDataSeeder::new(&client).seed().await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.created, 4);
    }

    #[tokio::test]
    async fn test_seed_twice_with_conflicts_is_clean() {
        let server = MockServer::start().await;
        // First pass creates, second pass sees everything as existing.
        Mock::given(method("POST"))
            .and(path("/api/v1/tenants"))
            .respond_with(ResponseTemplate::new(201))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/principles"))
            .respond_with(ResponseTemplate::new(201))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        mount(&server, "/api/v1/tenants", 409).await;
        mount(&server, "/api/v1/principles", 409).await;

        let client = ConstitutionClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let seeder = TestDataSeeder::new(&client);

        let first = seeder.seed().await;
        let second = seeder.seed().await;

        assert!(first.is_clean());
        assert!(second.is_clean());
        assert_eq!(first.created, 4);
        assert_eq!(second.created, 0);
        assert_eq!(second.already_present, 4);
    }

    #[tokio::test]
    async fn test_seed_server_errors_are_counted_not_raised() {
        let server = MockServer::start().await;
        mount(&server, "/api/v1/tenants", 500).await;
        mount(&server, "/api/v1/principles", 201).await;

        let client = ConstitutionClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let outcome = TestDataSeeder::new(&client).seed().await;

        assert!(!outcome.is_clean());
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.created, 3);
    }

    #[tokio::test]
    async fn test_seed_unreachable_service() {
        let client =
            ConstitutionClient::new("http://127.0.0.1:9", Duration::from_millis(300)).unwrap();
        let outcome = TestDataSeeder::new(&client).seed().await;
        assert_eq!(outcome.rejected, 4);
    }
}

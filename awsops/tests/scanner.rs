use anyhow::{Result, bail};
use async_trait::async_trait;
use awsops::scanner::{
    self, DynamoDbTable, InventorySource, LambdaFunction, ScanReport, SnsTopic, SqsQueue,
};

#[derive(Default)]
struct FakeAccount {
    functions: Vec<&'static str>,
    topics: usize,
    queues: usize,
    tables: Vec<&'static str>,
    deny_dynamodb: bool,
}

#[async_trait]
impl InventorySource for FakeAccount {
    async fn lambda_functions(&self) -> Result<Vec<LambdaFunction>> {
        Ok(self
            .functions
            .iter()
            .map(|name| LambdaFunction {
                function_name: name.to_string(),
                runtime: Some("nodejs20.x".into()),
                code_size: 1024,
                ..Default::default()
            })
            .collect())
    }

    async fn sns_topics(&self) -> Result<Vec<SnsTopic>> {
        Ok((0..self.topics)
            .map(|i| SnsTopic {
                topic_arn: format!("arn:aws:sns:us-east-1:123456789012:topic-{i}"),
            })
            .collect())
    }

    async fn sqs_queues(&self) -> Result<Vec<SqsQueue>> {
        Ok((0..self.queues)
            .map(|i| SqsQueue {
                queue_url: format!("https://sqs.us-east-1.amazonaws.com/123456789012/q-{i}"),
            })
            .collect())
    }

    async fn dynamo_db_tables(&self) -> Result<Vec<DynamoDbTable>> {
        if self.deny_dynamodb {
            bail!("AccessDeniedException: not authorized to perform dynamodb:ListTables");
        }
        Ok(self
            .tables
            .iter()
            .map(|t| DynamoDbTable {
                table_name: t.to_string(),
            })
            .collect())
    }

    async fn account_id(&self) -> Result<String> {
        Ok("123456789012".into())
    }
}

#[tokio::test]
async fn scan_collects_every_service() {
    let account = FakeAccount {
        functions: vec!["ingest", "notify"],
        topics: 3,
        queues: 1,
        tables: vec!["orders"],
        ..Default::default()
    };

    let inventory = scanner::scan(&account).await.unwrap();

    assert_eq!(inventory.resource_count(), 7);
    let names: Vec<&str> = inventory
        .lambda_functions
        .iter()
        .map(|f| f.function_name.as_str())
        .collect();
    assert_eq!(names, vec!["ingest", "notify"]);
    assert_eq!(inventory.sns_topics.len(), 3);
    assert_eq!(inventory.dynamo_db_tables[0].table_name, "orders");
}

#[tokio::test]
async fn empty_account_scans_to_nothing() {
    let inventory = scanner::scan(&FakeAccount::default()).await.unwrap();

    assert_eq!(inventory.resource_count(), 0);
    let v = serde_json::to_value(&inventory).unwrap();
    assert_eq!(v["snsTopics"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_failure_fails_the_scan() {
    let account = FakeAccount {
        functions: vec!["ingest"],
        deny_dynamodb: true,
        ..Default::default()
    };

    let err = scanner::scan(&account).await.unwrap_err();

    assert!(err.to_string().contains("AccessDenied"));
}

#[tokio::test]
async fn report_carries_account_and_email() {
    let account = FakeAccount {
        queues: 2,
        ..Default::default()
    };
    let source: &dyn InventorySource = &account;

    let report = ScanReport {
        resources: scanner::scan(source).await.unwrap(),
        aws_account_id: source.account_id().await.unwrap(),
        email: "ops@example.com".into(),
    };

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["awsAccountId"], "123456789012");
    assert_eq!(v["resources"]["sqsQueues"].as_array().unwrap().len(), 2);
}

//! Serverless inventory scan.
//!
//! Collects metadata about the account's Lambda functions, SNS topics, SQS
//! queues and DynamoDB tables, then hands it to the analysis service.

mod aws;
mod report;

pub use aws::AwsInventory;
pub use report::{ScanReport, send_report};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaFunction {
    pub function_name: String,
    pub function_arn: Option<String>,
    pub runtime: Option<String>,
    pub memory_size: Option<i32>,
    pub timeout: Option<i32>,
    pub code_size: i64,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnsTopic {
    pub topic_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsQueue {
    pub queue_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamoDbTable {
    pub table_name: String,
}

/// Everything one scan found, keyed by service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub lambda_functions: Vec<LambdaFunction>,
    pub sns_topics: Vec<SnsTopic>,
    pub sqs_queues: Vec<SqsQueue>,
    pub dynamo_db_tables: Vec<DynamoDbTable>,
}

impl Inventory {
    pub fn resource_count(&self) -> usize {
        self.lambda_functions.len()
            + self.sns_topics.len()
            + self.sqs_queues.len()
            + self.dynamo_db_tables.len()
    }
}

/// Where inventory comes from; the AWS implementation is [`AwsInventory`].
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn lambda_functions(&self) -> Result<Vec<LambdaFunction>>;
    async fn sns_topics(&self) -> Result<Vec<SnsTopic>>;
    async fn sqs_queues(&self) -> Result<Vec<SqsQueue>>;
    async fn dynamo_db_tables(&self) -> Result<Vec<DynamoDbTable>>;
    async fn account_id(&self) -> Result<String>;
}

/// List all four services concurrently. Fails on the first listing error.
pub async fn scan<S: InventorySource + ?Sized>(source: &S) -> Result<Inventory> {
    let (lambda_functions, sns_topics, sqs_queues, dynamo_db_tables) = tokio::try_join!(
        source.lambda_functions(),
        source.sns_topics(),
        source.sqs_queues(),
        source.dynamo_db_tables(),
    )?;

    Ok(Inventory {
        lambda_functions,
        sns_topics,
        sqs_queues,
        dynamo_db_tables,
    })
}

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::SdkConfig;

use super::{DynamoDbTable, InventorySource, LambdaFunction, SnsTopic, SqsQueue};
use crate::sqs::list_queue_urls;

/// Inventory read from the live account.
#[derive(Clone, Debug)]
pub struct AwsInventory {
    lambda: aws_sdk_lambda::Client,
    sns: aws_sdk_sns::Client,
    sqs: aws_sdk_sqs::Client,
    dynamodb: aws_sdk_dynamodb::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsInventory {
    pub fn new(shared: &SdkConfig) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(shared),
            sns: aws_sdk_sns::Client::new(shared),
            sqs: aws_sdk_sqs::Client::new(shared),
            dynamodb: aws_sdk_dynamodb::Client::new(shared),
            sts: aws_sdk_sts::Client::new(shared),
        }
    }
}

#[async_trait]
impl InventorySource for AwsInventory {
    async fn lambda_functions(&self) -> Result<Vec<LambdaFunction>> {
        let mut functions = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .lambda
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .context("listing Lambda functions")?;

            functions.extend(out.functions().iter().map(|f| LambdaFunction {
                function_name: f.function_name().unwrap_or_default().to_string(),
                function_arn: f.function_arn().map(|s| s.to_string()),
                runtime: f.runtime().map(|r| r.as_str().to_string()),
                memory_size: f.memory_size(),
                timeout: f.timeout(),
                code_size: f.code_size(),
                last_modified: f.last_modified().map(|s| s.to_string()),
            }));

            match out.next_marker() {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }
        Ok(functions)
    }

    async fn sns_topics(&self) -> Result<Vec<SnsTopic>> {
        let mut topics = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .sns
                .list_topics()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("listing SNS topics")?;

            topics.extend(out.topics().iter().filter_map(|t| {
                t.topic_arn().map(|arn| SnsTopic {
                    topic_arn: arn.to_string(),
                })
            }));

            match out.next_token() {
                Some(t) => next_token = Some(t.to_string()),
                None => break,
            }
        }
        Ok(topics)
    }

    async fn sqs_queues(&self) -> Result<Vec<SqsQueue>> {
        let urls = list_queue_urls(&self.sqs).await?;
        Ok(urls
            .into_iter()
            .map(|queue_url| SqsQueue { queue_url })
            .collect())
    }

    async fn dynamo_db_tables(&self) -> Result<Vec<DynamoDbTable>> {
        let mut tables = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let out = self
                .dynamodb
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .context("listing DynamoDB tables")?;

            tables.extend(out.table_names().iter().map(|name| DynamoDbTable {
                table_name: name.clone(),
            }));

            match out.last_evaluated_table_name() {
                Some(last) => start = Some(last.to_string()),
                None => break,
            }
        }
        Ok(tables)
    }

    async fn account_id(&self) -> Result<String> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .context("getting caller identity")?;

        out.account()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("account id missing in caller identity"))
    }
}

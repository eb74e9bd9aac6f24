use std::fmt::Display;
use tokio::task::JoinHandle;
use tokio_postgres::row::RowIndex;
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{Client, NoTls, Row, SimpleQueryMessage};
use crate::metadata::postgres::classify;
use crate::metadata::MetadataFeature;
use crate::{Result, TablescopeError};

const MINIMUM_SERVER_VERSION: i32 = 120000;

/// Owns a tokio-postgres client and the task driving its connection.
pub struct PostgresClientWrapper {
    client: Client,
    join_handle: JoinHandle<Result<()>>,
}

impl PostgresClientWrapper {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| TablescopeError::Connectivity(e.to_string()))?;

        // The connection object performs the actual communication with the database,
        // so spawn it off to run on its own.
        let join_handle = tokio::spawn(async move {
            match connection.await {
                Err(e) => Err(TablescopeError::PostgresError(e)),
                Ok(_) => Ok(()),
            }
        });

        let wrapper = PostgresClientWrapper { client, join_handle };
        wrapper.check_server_version().await?;

        Ok(wrapper)
    }

    /// The reply to a simple query starts with a row description, the version is in the first data row.
    async fn check_server_version(&self) -> Result {
        let sql = "SHOW server_version_num;";
        let messages = self.client.simple_query(sql).await.map_err(|e| {
            let error = TablescopeError::PostgresErrorWithQuery {
                query: sql.to_string(),
                source: e,
            };
            classify(MetadataFeature::Product, error, self.client.is_closed())
        })?;

        let version: i32 = messages
            .iter()
            .find_map(|message| match message {
                SimpleQueryMessage::Row(row) => row.get(0).and_then(|v| v.parse().ok()),
                _ => None,
            })
            .ok_or(TablescopeError::InvalidPostgresVersionResponse)?;

        if version < MINIMUM_SERVER_VERSION {
            return Err(TablescopeError::UnsupportedPostgresVersion(version));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn execute_non_query(&self, sql: &str) -> Result {
        self.client.batch_execute(sql).await.map_err(|e| TablescopeError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })
    }

    pub async fn get_results<T: FromRow>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<T>> {
        let query_results = self.client.query(sql, params).await.map_err(|e| TablescopeError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })?;

        let mut output = Vec::with_capacity(query_results.len());

        for row in query_results.into_iter() {
            output.push(T::from_row(row)?);
        }

        Ok(output)
    }

    pub async fn get_single_results<T: FromSqlOwned>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<T>> {
        let r = self
            .get_results::<(T,)>(sql, params)
            .await?
            .into_iter()
            .map(|t| t.0)
            .collect();

        Ok(r)
    }

    pub async fn get_single_result<T: FromSqlOwned>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<T> {
        let results = self.get_single_results(sql, params).await?;
        let actual = results.len();

        match <[T; 1]>::try_from(results) {
            Ok([result]) => Ok(result),
            Err(_) => Err(TablescopeError::InvalidNumberOfResults { actual, expected: 1 }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl Drop for PostgresClientWrapper {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl<T1: FromSqlOwned> FromRow for (T1,) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?,))
    }
}

pub(crate) trait FromPgChar: Sized {
    fn from_pg_char(c: char) -> std::result::Result<Self, TablescopeError>;
}

pub(crate) trait RowEnumExt {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T>;
    fn try_get_opt_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<Option<T>>;
}

impl RowEnumExt for Row {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T> {
        let value: i8 = self.try_get(idx)?;
        let c = value as u8 as char;
        T::from_pg_char(c)
    }

    fn try_get_opt_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<Option<T>> {
        let value: Option<i8> = self.try_get(idx)?;
        match value {
            Some(value) => {
                let c = value as u8 as char;
                Ok(Some(T::from_pg_char(c)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn message(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut message = vec![tag];
        message.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        message.extend_from_slice(body);
        message
    }

    fn version_reply(version: &str) -> Vec<u8> {
        let mut description = 1i16.to_be_bytes().to_vec();
        description.extend_from_slice(b"server_version_num\0");
        description.extend_from_slice(&0i32.to_be_bytes());
        description.extend_from_slice(&0i16.to_be_bytes());
        description.extend_from_slice(&25i32.to_be_bytes());
        description.extend_from_slice(&(-1i16).to_be_bytes());
        description.extend_from_slice(&(-1i32).to_be_bytes());
        description.extend_from_slice(&0i16.to_be_bytes());

        let mut data = 1i16.to_be_bytes().to_vec();
        data.extend_from_slice(&(version.len() as i32).to_be_bytes());
        data.extend_from_slice(version.as_bytes());

        [
            message(b'T', &description),
            message(b'D', &data),
            message(b'C', b"SHOW\0"),
            message(b'Z', b"I"),
        ]
        .concat()
    }

    async fn read_startup(socket: &mut TcpStream) {
        let length = socket.read_i32().await.unwrap();
        let mut body = vec![0; length as usize - 4];
        socket.read_exact(&mut body).await.unwrap();

        let ready = [message(b'R', &0i32.to_be_bytes()), message(b'Z', b"I")].concat();
        socket.write_all(&ready).await.unwrap();
    }

    async fn read_query(socket: &mut TcpStream) -> String {
        assert_eq!(socket.read_u8().await.unwrap(), b'Q');
        let length = socket.read_i32().await.unwrap();
        let mut body = vec![0; length as usize - 4];
        socket.read_exact(&mut body).await.unwrap();
        String::from_utf8_lossy(&body).trim_end_matches('\0').to_string()
    }

    /// Accepts one connection and answers its first query with `reply`, or hangs up when there is none.
    async fn serve_once(reply: Option<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_startup(&mut socket).await;
            let query = read_query(&mut socket).await;
            assert_eq!(query, "SHOW server_version_num;");

            if let Some(reply) = reply {
                socket.write_all(&reply).await.unwrap();
                let mut rest = Vec::new();
                let _ = socket.read_to_end(&mut rest).await;
            }
        });

        format!("host=127.0.0.1 port={} user=test dbname=test sslmode=disable", port)
    }

    #[tokio::test]
    async fn reads_the_version_after_the_row_description() {
        let connection_string = serve_once(Some(version_reply("150004"))).await;

        let wrapper = PostgresClientWrapper::new(&connection_string).await.unwrap();

        assert!(!wrapper.is_closed());
    }

    #[tokio::test]
    async fn rejects_old_servers() {
        let connection_string = serve_once(Some(version_reply("110022"))).await;

        let result = PostgresClientWrapper::new(&connection_string).await;

        assert!(matches!(result, Err(TablescopeError::UnsupportedPostgresVersion(110022))));
    }

    #[tokio::test]
    async fn a_connection_lost_during_the_version_check_is_a_connectivity_error() {
        let connection_string = serve_once(None).await;

        let result = PostgresClientWrapper::new(&connection_string).await;

        let error = result.err().unwrap();
        assert!(error.is_connectivity(), "{:?}", error);
    }
}

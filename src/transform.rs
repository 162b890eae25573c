use failure::bail;

use crate::proto::{Response, ZkError};
use crate::{error, Stat};

pub(crate) fn create(
    res: Result<Response, ZkError>,
) -> Result<Result<String, error::Create>, failure::Error> {
    match res {
        Ok(Response::String(s)) => Ok(Ok(s)),
        Ok(r) => bail!("got non-string response to create: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::Create::NoNode)),
        Err(ZkError::NodeExists) => Ok(Err(error::Create::NodeExists)),
        Err(ZkError::InvalidACL) => Ok(Err(error::Create::InvalidAcl)),
        Err(ZkError::NoChildrenForEphemerals) => Ok(Err(error::Create::NoChildrenForEphemerals)),
        Err(ZkError::NoAuth) | Err(ZkError::AuthFailed) => Ok(Err(error::Create::AuthFailed)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn set_data(
    version: i32,
    res: Result<Response, ZkError>,
) -> Result<Result<Stat, error::SetData>, failure::Error> {
    match res {
        Ok(Response::Stat(stat)) => Ok(Ok(stat)),
        Ok(r) => bail!("got a non-stat response to a set_data request: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::SetData::NoNode)),
        Err(ZkError::BadVersion) => Ok(Err(error::SetData::BadVersion { expected: version })),
        Err(ZkError::NoAuth) => Ok(Err(error::SetData::NoAuth)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn delete(
    version: i32,
    res: Result<Response, ZkError>,
) -> Result<Result<(), error::Delete>, failure::Error> {
    match res {
        Ok(Response::Empty) => Ok(Ok(())),
        Ok(r) => bail!("got non-empty response to delete: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::Delete::NoNode)),
        Err(ZkError::NotEmpty) => Ok(Err(error::Delete::NotEmpty)),
        Err(ZkError::BadVersion) => Ok(Err(error::Delete::BadVersion { expected: version })),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn exists(res: Result<Response, ZkError>) -> Result<Option<Stat>, failure::Error> {
    match res {
        Ok(Response::Stat(stat)) => Ok(Some(stat)),
        Ok(r) => bail!("got a non-stat response to an exists request: {:?}", r),
        Err(ZkError::NoNode) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn get_children(
    res: Result<Response, ZkError>,
) -> Result<Result<Vec<String>, error::GetChildren>, failure::Error> {
    match res {
        Ok(Response::Strings(children)) => Ok(Ok(children)),
        Ok(r) => bail!("got non-strings response to get-children: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::GetChildren::NoNode)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn get_data(
    res: Result<Response, ZkError>,
) -> Result<Result<(Vec<u8>, Stat), error::GetData>, failure::Error> {
    match res {
        Ok(Response::GetData { bytes, stat }) => Ok(Ok((bytes, stat))),
        Ok(r) => bail!("got non-data response to get-data: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::GetData::NoNode)),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn sync(
    res: Result<Response, ZkError>,
) -> Result<Result<(), error::Sync>, failure::Error> {
    match res {
        Ok(Response::String(_)) => Ok(Ok(())),
        Ok(r) => bail!("got non-string response to sync: {:?}", r),
        Err(ZkError::NoNode) => Ok(Err(error::Sync::NoNode)),
        Err(e) => Err(e.into()),
    }
}

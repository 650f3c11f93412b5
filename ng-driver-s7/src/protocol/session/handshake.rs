use super::{
    super::{
        codec::Codec,
        error::{Error, Result},
        frame::{
            build_cotp_cr_message, build_data_message, build_setup_comm, Cotp, CotpConnParams,
            S7Function, SetupCommParams,
        },
    },
    recv_pdu,
    state::SessionConfig,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

/// COTP CR/CC on a freshly connected transport. Returns the confirm.
pub(super) async fn iso_connect(
    framed: &mut Framed<TcpStream, Codec>,
    config: &SessionConfig,
) -> Result<CotpConnParams> {
    let cr = CotpConnParams::request(config.tsap_src, config.tsap_dst);
    timeout(config.write_timeout, framed.send(build_cotp_cr_message(cr)))
        .await
        .map_err(|_| Error::ErrConnectTimeout)??;

    let msg = timeout(config.read_timeout, framed.next())
        .await
        .map_err(|_| Error::ErrConnectTimeout)?
        .ok_or(Error::ErrUseClosedConnection)??;
    match msg.cotp {
        Cotp::Cc(params) => Ok(params),
        // PLC refused the TSAPs
        Cotp::Dr(_) => Err(Error::ErrUseClosedConnection),
        _ => Err(Error::ErrUnexpectedPdu),
    }
}

/// Setup Communication exchange. Returns the values the PLC accepted.
pub(super) async fn negotiation(
    framed: &mut Framed<TcpStream, Codec>,
    config: &SessionConfig,
    pdu_ref: u16,
) -> Result<SetupCommParams> {
    let proposed = SetupCommParams {
        amq_caller: config.preferred_amq_caller,
        amq_callee: config.preferred_amq_callee,
        pdu_len: config.preferred_pdu_size,
    };
    let msg = build_data_message(build_setup_comm(pdu_ref, proposed)?);
    timeout(config.write_timeout, framed.send(msg))
        .await
        .map_err(|_| Error::ErrConnectTimeout)??;

    let pdu = timeout(config.read_timeout, recv_pdu(framed))
        .await
        .map_err(|_| Error::ErrConnectTimeout)??;
    pdu.validate_response()?;
    if pdu.function() != Some(S7Function::SetupCommunication) {
        return Err(Error::ErrUnexpectedPdu);
    }
    let accepted = SetupCommParams::parse(&pdu.param)?;
    if accepted.pdu_len == 0 {
        return Err(Error::ProtocolViolation {
            context: "PLC negotiated a zero PDU length",
        });
    }
    Ok(SetupCommParams {
        pdu_len: accepted.pdu_len.min(proposed.pdu_len),
        ..accepted
    })
}

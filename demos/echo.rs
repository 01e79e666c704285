//! A minimal UDP echo demo: binds two endpoints on a software loopback
//! device, sends a datagram from one to the other, and prints what comes
//! back out of `recvfrom`. Exercises `SocketApi` end to end without a real
//! link driver or elevated privileges.

use hobnet::iface::{Config, Interface};
use hobnet::phy::{Loopback, Medium};
use hobnet::socket::api::{Kind, SocketApi};
use hobnet::time::Instant;
use hobnet::wire::{EthernetAddress, IpAddress, IpCidr, IpEndpoint};

fn main() {
    env_logger::init();

    let mut device = Loopback::new(Medium::Ethernet);
    let mut config = Config::new(EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]).into());
    config.random_seed = rand::random();

    let now = Instant::now();
    let mut iface = Interface::new(config, &mut device, now);
    iface.update_ip_addrs(|addrs| {
        addrs.push(IpCidr::new(IpAddress::v4(127, 0, 0, 1), 8));
    });

    let mut api = SocketApi::new(iface);

    let server = api.socket(Kind::Datagram).expect("allocate server socket");
    api.bind(server, 7u16).expect("bind server");

    let client = api.socket(Kind::Datagram).expect("allocate client socket");
    api.bind(client, 0u16).expect("bind client");

    let server_addr = IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 7);
    api.sendto(client, b"hello, loopback", server_addr)
        .expect("send datagram");

    let deadline = now + hobnet::time::Duration::from_secs(1);
    let mut received = None;
    while Instant::now() < deadline {
        api.poll(Instant::now(), &mut device);

        let mut buf = [0u8; 64];
        match api.recvfrom(server, &mut buf) {
            Ok((n, from)) => {
                received = Some((buf[..n].to_vec(), from));
                break;
            }
            Err(hobnet::socket::api::Error::WouldBlock) => continue,
            Err(e) => panic!("recvfrom failed: {e:?}"),
        }
    }

    match received {
        Some((payload, from)) => {
            println!(
                "server received {:?} from {}",
                String::from_utf8_lossy(&payload),
                from
            );
        }
        None => eprintln!("no datagram arrived within the deadline"),
    }
}
